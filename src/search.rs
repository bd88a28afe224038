//! Similarity search over an instance, and the `rrag search` command.

use anyhow::{bail, Result};
use record_rag_core::search::{log_context, search_corpus_where, LogFilter, SearchHit};
use record_rag_core::{LogRecord, Record};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::generation::{create_generator, generate_answer, PromptKind};
use crate::instance::{open_logs, Instance};

/// Embed `query` and rank the instance's current corpus against it.
///
/// Blank queries are rejected before the embedder is called. An empty
/// corpus surfaces as [`record_rag_core::RagError::EmptyIndex`] inside the
/// returned error.
pub async fn semantic_search<R: Record + DeserializeOwned>(
    instance: &Instance<R>,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit<R>>> {
    semantic_search_where(instance, query, k, |_| true).await
}

pub async fn semantic_search_where<R, F>(
    instance: &Instance<R>,
    query: &str,
    k: usize,
    predicate: F,
) -> Result<Vec<SearchHit<R>>>
where
    R: Record + DeserializeOwned,
    F: Fn(&R) -> bool,
{
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }
    let query_vec = instance.embedder().embed_query(query).await?;
    let corpus = instance.corpus().load();
    Ok(search_corpus_where(&corpus, &query_vec, k, predicate)?)
}

/// Log search honoring node/severity/alarm constraints.
pub async fn search_logs(
    instance: &Instance<LogRecord>,
    query: &str,
    k: usize,
    filter: &LogFilter,
) -> Result<Vec<SearchHit<LogRecord>>> {
    semantic_search_where(instance, query, k, |r| filter.matches(r)).await
}

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    filter: LogFilter,
    summarize: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let embedder = Arc::new(Embedder::from_config(&config.embedding)?);
    let logs = open_logs(config, embedder).await?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let hits = match search_logs(&logs, query, k, &filter).await {
        Ok(hits) => hits,
        Err(e) if is_empty_index(&e) => {
            println!("No data indexed yet.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if hits.is_empty() {
        println!("No results.");
    }
    for (i, hit) in hits.iter().enumerate() {
        let r = &hit.record;
        println!(
            "{}. [{:.2}] {} {} {} {}",
            i + 1,
            hit.score,
            r.timestamp,
            r.node_id,
            r.severity,
            r.alarm_code
        );
        println!("    {}", r.message);
    }

    if summarize {
        let generator = create_generator(&config.generation);
        let answer =
            generate_answer(generator.as_ref(), &log_context(&hits), query, PromptKind::RootCause)
                .await;
        println!();
        println!("{}", answer);
    }
    Ok(())
}

/// Whether `err` (or anything it wraps) is an empty-index condition.
pub fn is_empty_index(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<record_rag_core::RagError>(),
            Some(record_rag_core::RagError::EmptyIndex)
        )
    })
}
