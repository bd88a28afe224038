//! Retrieval quality metrics.

use serde::{Deserialize, Serialize};

/// One evaluated query, as persisted in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub query: String,
    #[serde(rename = "precision@k")]
    pub precision_at_k: f64,
    pub latency_s: f64,
}

impl EvaluationRecord {
    /// Build a record with display rounding applied: precision to two
    /// decimals, latency to three.
    pub fn rounded(query: impl Into<String>, precision: f64, latency_s: f64) -> Self {
        Self {
            query: query.into(),
            precision_at_k: round_to(precision, 2),
            latency_s: round_to(latency_s, 3),
        }
    }
}

/// Fraction of `keywords` found (case-insensitive substring) in the
/// concatenated retrieved texts. An empty keyword list scores `0.0`.
pub fn precision_at_k<A: AsRef<str>, B: AsRef<str>>(retrieved: &[A], keywords: &[B]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack = retrieved
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let hits = keywords
        .iter()
        .filter(|kw| haystack.contains(&kw.as_ref().to_lowercase()))
        .count();
    hits as f64 / keywords.len() as f64
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
