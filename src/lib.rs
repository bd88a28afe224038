//! # Record RAG
//!
//! Retrieval-augmented answers over small tabular record sets: network-log
//! events and intercity trip statistics.
//!
//! Each configured instance reads CSV files from a data directory, embeds one
//! text field per row, and keeps an in-memory exact inner-product index
//! aligned with the rows. A background watcher fingerprints the files and
//! folds changes into the index. Questions go either through vector search
//! (logs) or through a rule-based filter parser (trips), and the retrieved
//! context is handed to a language model for a short answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ CSV files  │──▶│ Builder      │──▶│ SharedCorpus      │◀── Watcher
//! │ data_dir/  │   │ embed + add  │   │ index + rows      │    (poll, append)
//! └────────────┘   └──────────────┘   └────────┬─────────┘
//!                                              │
//!                        ┌─────────────────────┤
//!                        ▼                     ▼
//!                  ┌───────────┐         ┌───────────┐
//!                  │ CLI rrag  │         │ HTTP      │──▶ Generator
//!                  └───────────┘         └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | Embedding providers and the shared `Embedder` |
//! | [`sources`] | Source discovery, CSV reading, fingerprints |
//! | [`snapshot`] | Index snapshot files |
//! | [`builder`] | Index Builder |
//! | [`instance`] | A configured, opened record instance |
//! | [`watcher`] | Change Watcher |
//! | [`search`] | Similarity search and `rrag search` |
//! | [`ask`] | Trip filter path and `rrag ask` |
//! | [`generation`] | Generation collaborator |
//! | [`evaluate`] | precision@k / latency evaluator |
//! | [`server`] | HTTP server |
//!
//! Pure logic (index, corpus, parser, filter engine) lives in
//! `record-rag-core`, re-exported here as [`core`].

pub use record_rag_core as core;

pub mod ask;
pub mod builder;
pub mod config;
pub mod embedding;
pub mod evaluate;
pub mod generation;
pub mod instance;
pub mod search;
pub mod server;
pub mod snapshot;
pub mod sources;
pub mod watcher;
