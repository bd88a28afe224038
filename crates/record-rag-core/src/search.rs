//! Similarity search over a [`Corpus`].
//!
//! The caller embeds the query; this module ranks the corpus against the
//! query vector and joins the matches back to their rows. Ordering follows
//! [`rank_order`](crate::index::rank_order): descending score, ties broken by
//! the lower row position.

use serde::Serialize;

use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{LogRecord, Record};
use crate::store::Corpus;

/// A ranked record with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<R> {
    /// Row position in the corpus.
    pub position: usize,
    /// Inner-product similarity to the query.
    pub score: f32,
    pub record: R,
}

/// Top-`k` rows for `query_vec`.
///
/// `k` is clamped to the corpus size. An empty corpus is reported as
/// [`RagError::EmptyIndex`] so callers can tell "no data" from "no match".
pub fn search_corpus<R: Record, I: VectorIndex>(
    corpus: &Corpus<R, I>,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<SearchHit<R>>> {
    search_corpus_where(corpus, query_vec, k, |_| true)
}

/// Like [`search_corpus`], keeping only rows accepted by `predicate`.
///
/// The predicate is applied over the full ranking before truncation, so up
/// to `k` accepted rows are returned even when better-scoring rows are
/// rejected.
pub fn search_corpus_where<R, I, F>(
    corpus: &Corpus<R, I>,
    query_vec: &[f32],
    k: usize,
    predicate: F,
) -> Result<Vec<SearchHit<R>>>
where
    R: Record,
    I: VectorIndex,
    F: Fn(&R) -> bool,
{
    let count = corpus.index().count();
    if count == 0 {
        return Err(RagError::EmptyIndex);
    }

    let neighbors = corpus.index().search(query_vec, count)?;
    let hits = neighbors
        .into_iter()
        .filter_map(|n| {
            corpus.row(n.position).map(|record| SearchHit {
                position: n.position,
                score: n.score,
                record: record.clone(),
            })
        })
        .filter(|hit| predicate(&hit.record))
        .take(k.min(count))
        .collect();
    Ok(hits)
}

/// Optional attribute constraints for log searches.
///
/// Each set field must equal the record's value, ignoring case. Unset fields
/// match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogFilter {
    pub node_id: Option<String>,
    pub severity: Option<String>,
    pub alarm_code: Option<String>,
}

impl LogFilter {
    pub fn is_empty(&self) -> bool {
        self.node_id.is_none() && self.severity.is_none() && self.alarm_code.is_none()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        fn field_ok(want: &Option<String>, have: &str) -> bool {
            want.as_deref()
                .map_or(true, |w| w.to_lowercase() == have.to_lowercase())
        }
        field_ok(&self.node_id, &record.node_id)
            && field_ok(&self.severity, &record.severity)
            && field_ok(&self.alarm_code, &record.alarm_code)
    }
}

/// Join the message text of log hits the way the summary prompt expects.
pub fn log_context(hits: &[SearchHit<LogRecord>]) -> String {
    hits.iter()
        .map(|h| h.record.message.as_str())
        .collect::<Vec<_>>()
        .join(" | ")
}
