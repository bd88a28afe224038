//! Record types for the two domain instances.
//!
//! A record's identity is its position in the row store; none of these
//! types carry an id of their own.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A row that can be embedded and indexed.
pub trait Record: Clone + Send + Sync + 'static {
    /// The text whose embedding represents this record.
    fn embedding_text(&self) -> Cow<'_, str>;
}

/// One network-log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub node_id: String,
    pub severity: String,
    pub alarm_code: String,
    pub message: String,
}

impl Record for LogRecord {
    fn embedding_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.message)
    }
}

/// One intercity bus route with aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub from_city: String,
    pub to_city: String,
    pub avg_duration_hr: f64,
    pub avg_price_try: f64,
    pub company: String,
    pub freq_per_day: u32,
}

impl TripRecord {
    /// Column names in source order, used for table rendering.
    pub const COLUMNS: [&'static str; 6] = [
        "from_city",
        "to_city",
        "avg_duration_hr",
        "avg_price_try",
        "company",
        "freq_per_day",
    ];

    /// Cell values in [`TripRecord::COLUMNS`] order.
    pub fn cells(&self) -> [String; 6] {
        [
            self.from_city.clone(),
            self.to_city.clone(),
            self.avg_duration_hr.to_string(),
            self.avg_price_try.to_string(),
            self.company.clone(),
            self.freq_per_day.to_string(),
        ]
    }
}

impl Record for TripRecord {
    fn embedding_text(&self) -> Cow<'_, str> {
        Cow::Owned(format!(
            "{} - {} {}",
            self.from_city, self.to_city, self.company
        ))
    }
}
