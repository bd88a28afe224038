//! Filter path over trip records: parse, filter, explain, answer.
//!
//! Both `rrag ask` and `POST /ask` answer from the trip instance's published
//! corpus. The filtered table comes from its rows; the related trips come
//! from its vectors, ranked against the question.

use anyhow::Result;
use record_rag_core::filter::{apply_filters, explain_top, markdown_table, plain_table, TABLE_ROWS};
use record_rag_core::parser::{parse, Language, StructuredFilter};
use record_rag_core::search::{search_corpus, SearchHit};
use record_rag_core::TripRecord;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::generation::{create_generator, generate_answer, Answer, PromptKind};
use crate::instance::{open_trips, TripInstance};

/// Everything the filter path derives from one question.
#[derive(Debug, Clone, Serialize)]
pub struct TripAnswer {
    pub query: String,
    pub language: Language,
    pub filter: StructuredFilter,
    /// Rows left after filtering.
    pub matched: usize,
    /// The first rows of the filtered table.
    pub rows: Vec<TripRecord>,
    pub explanation: Option<String>,
    pub table: String,
    /// Nearest trips by embedding similarity, independent of the filter.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<SearchHit<TripRecord>>,
    #[serde(skip)]
    context: String,
}

impl TripAnswer {
    pub fn from_rows(rows: &[TripRecord], query: &str) -> Self {
        let filter = parse(query);
        let language = Language::detect(query);
        let filtered = apply_filters(rows, &filter);
        Self {
            query: query.to_string(),
            language,
            matched: filtered.len(),
            explanation: explain_top(&filtered, language),
            table: if filtered.is_empty() {
                String::new()
            } else {
                markdown_table(&filtered)
            },
            context: if filtered.is_empty() {
                String::new()
            } else {
                plain_table(&filtered)
            },
            rows: filtered.into_iter().take(TABLE_ROWS).collect(),
            related: Vec::new(),
            filter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matched == 0
    }

    /// Message shown instead of a table when nothing matched.
    pub fn no_results_message(&self) -> &'static str {
        match self.language {
            Language::Turkish => "Uygun sefer bulunamadı.",
            Language::English => "No results.",
        }
    }

    /// Ask the generator about the filtered table. Empty results short-circuit.
    pub async fn summarize(&self, generator: &dyn crate::generation::Generator) -> Answer {
        generate_answer(
            generator,
            &self.context,
            &self.query,
            PromptKind::TripTable(self.language),
        )
        .await
    }
}

/// Answer `query` from one snapshot of the trip corpus, with up to `k`
/// related trips. Blank questions skip the embedder.
pub async fn answer_trip_question(
    instance: &TripInstance,
    query: &str,
    k: usize,
) -> Result<TripAnswer> {
    let corpus = instance.corpus().load();
    let mut answer = TripAnswer::from_rows(corpus.rows(), query);
    if k > 0 && !corpus.is_empty() && !query.trim().is_empty() {
        let query_vec = instance.embedder().embed_query(query).await?;
        answer.related = search_corpus(&corpus, &query_vec, k)?;
    }
    Ok(answer)
}

pub async fn run_ask(config: &Config, query: &str, summarize: bool) -> Result<()> {
    let embedder = Arc::new(Embedder::from_config(&config.embedding)?);
    let trips = open_trips(config, embedder).await?;
    let answer = answer_trip_question(&trips, query, config.retrieval.top_k).await?;
    println!("filter: {}", serde_json::to_string(&answer.filter)?);
    println!();

    if answer.is_empty() {
        println!("{}", answer.no_results_message());
    } else {
        if let Some(explanation) = &answer.explanation {
            println!("{}", explanation);
            println!();
        }
        println!("{}", answer.table);
        if answer.matched > TABLE_ROWS {
            println!("({} of {} rows shown)", TABLE_ROWS, answer.matched);
        }
    }

    if !answer.related.is_empty() {
        println!();
        println!("Related trips:");
        for (i, hit) in answer.related.iter().enumerate() {
            let r = &hit.record;
            println!(
                "{}. [{:.2}] {} - {} ({}, {} h, {} TRY)",
                i + 1,
                hit.score,
                r.from_city,
                r.to_city,
                r.company,
                r.avg_duration_hr,
                r.avg_price_try
            );
        }
    }

    if summarize {
        let generator = create_generator(&config.generation);
        println!();
        println!("{}", answer.summarize(generator.as_ref()).await);
    }
    Ok(())
}
