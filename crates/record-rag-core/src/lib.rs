//! # Record RAG Core
//!
//! Shared, synchronous logic for Record RAG: record models, the error
//! taxonomy, vector utilities, the vector index, the corpus handle that keeps
//! the index and its row store aligned, similarity search, and the
//! natural-language filter parser and engine.
//!
//! This crate contains no tokio, network, or filesystem I/O. Embedding,
//! source reading, and persistence live in the `record-rag` app crate.

pub mod embedding;
pub mod error;
pub mod eval;
pub mod filter;
pub mod index;
pub mod models;
pub mod parser;
pub mod search;
pub mod store;

pub use error::{RagError, Result};
pub use index::{FlatIndex, VectorIndex};
pub use models::{LogRecord, Record, TripRecord};
pub use store::{Corpus, SharedCorpus};
