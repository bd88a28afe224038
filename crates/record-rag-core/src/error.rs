//! Error taxonomy shared by the core and the app crate.

use thiserror::Error;

/// Errors raised by the retrieval pipeline.
///
/// Filter-parser ambiguity is deliberately absent: conflicting phrases are
/// resolved by rule order and never surface as an error.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RagError {
    /// A source file is missing, unreadable, or does not match the record schema.
    #[error("Failed to read source {path}: {reason}")]
    SourceRead { path: String, reason: String },

    /// A vector does not have the dimension the index was created with.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding model could not be loaded.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A loaded embedding provider failed on a batch.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// The index holds no vectors.
    #[error("Index is empty")]
    EmptyIndex,

    /// The generation collaborator failed.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// An append supplied a different number of rows and vectors.
    #[error("Misaligned batch: {rows} rows vs {vectors} vectors")]
    MisalignedBatch { rows: usize, vectors: usize },

    /// An index snapshot blob could not be decoded.
    #[error("Invalid index snapshot: {0}")]
    Snapshot(String),
}

impl RagError {
    pub fn source_read(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        RagError::SourceRead {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether a background update hitting this error should simply retry on
    /// the next cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::SourceRead { .. } | RagError::Embedding(_) | RagError::Snapshot(_)
        )
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, RagError>;
