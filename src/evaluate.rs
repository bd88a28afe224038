//! Evaluator: precision@k and latency over a fixed query set.

use anyhow::{Context, Result};
use record_rag_core::eval::{precision_at_k, EvaluationRecord};
use record_rag_core::Record;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::{Config, EvalQuery};
use crate::embedding::Embedder;
use crate::instance::{open_logs, Instance};
use crate::search::{is_empty_index, semantic_search};

/// Time one search per query, score it, and overwrite the report at
/// `report_path` once every query has run.
///
/// An empty index scores 0.0 rather than failing the run.
pub async fn run_evaluation<R: Record + DeserializeOwned>(
    instance: &Instance<R>,
    queries: &[EvalQuery],
    k: usize,
    report_path: &Path,
) -> Result<Vec<EvaluationRecord>> {
    let mut records = Vec::with_capacity(queries.len());

    for q in queries {
        let start = Instant::now();
        let result = semantic_search(instance, &q.query, k).await;
        let latency = start.elapsed().as_secs_f64();

        let retrieved: Vec<String> = match result {
            Ok(hits) => hits
                .iter()
                .map(|h| h.record.embedding_text().into_owned())
                .collect(),
            Err(e) if is_empty_index(&e) => Vec::new(),
            Err(e) => return Err(e.context(format!("Evaluation query failed: {}", q.query))),
        };

        let record =
            EvaluationRecord::rounded(&q.query, precision_at_k(&retrieved, &q.keywords), latency);
        println!(
            "{:<32} precision@{}={:.2} latency={:.3}s",
            record.query, k, record.precision_at_k, record.latency_s
        );
        records.push(record);
    }

    write_report(report_path, &records)?;
    info!(path = %report_path.display(), queries = records.len(), "wrote evaluation report");
    Ok(records)
}

pub fn write_report(path: &Path, records: &[EvaluationRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// The last report, or `None` if no evaluation has run yet.
pub fn load_report(path: &Path) -> Result<Option<Vec<EvaluationRecord>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<EvaluationRecord>, _>>()
        .with_context(|| format!("Malformed report: {}", path.display()))?;
    Ok(Some(records))
}

pub async fn run_evaluate(config: &Config) -> Result<()> {
    let embedder = Arc::new(Embedder::from_config(&config.embedding)?);
    let logs = open_logs(config, embedder).await?;
    let queries = config.evaluation.queries_or_default();
    let records = run_evaluation(
        &logs,
        &queries,
        config.evaluation.k,
        &config.evaluation.report_path,
    )
    .await?;

    let mean = records.iter().map(|r| r.precision_at_k).sum::<f64>() / records.len().max(1) as f64;
    println!();
    println!(
        "{} queries, mean precision@{} = {:.2}, report: {}",
        records.len(),
        config.evaluation.k,
        mean,
        config.evaluation.report_path.display()
    );
    Ok(())
}

pub fn run_metrics(config: &Config) -> Result<()> {
    match load_report(&config.evaluation.report_path)? {
        None => println!("No metrics yet. Run `rrag evaluate` first."),
        Some(records) => {
            println!("{:<32} {:>12} {:>10}", "QUERY", "PRECISION@K", "LATENCY_S");
            for r in records {
                println!("{:<32} {:>12.2} {:>10.3}", r.query, r.precision_at_k, r.latency_s);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_report_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_report(&tmp.path().join("eval_results.csv")).unwrap().is_none());
    }

    #[test]
    fn test_report_overwrites() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out/eval_results.csv");
        write_report(&path, &[EvaluationRecord::rounded("a", 0.5, 0.1234)]).unwrap();
        write_report(&path, &[EvaluationRecord::rounded("b", 1.0, 0.01)]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("query,precision@k,latency_s\n"));
        let records = load_report(&path).unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query, "b");
    }
}
