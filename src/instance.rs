//! A configured record instance: its sources, its shared corpus, and the
//! embedder it was built with.

use anyhow::{Context, Result};
use record_rag_core::{LogRecord, Record, SharedCorpus, TripRecord};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;

use crate::builder::{self, Built};
use crate::config::{Config, SourceConfig};
use crate::embedding::Embedder;
use crate::sources::{ContentSnapshot, RecordSource};

pub type LogInstance = Instance<LogRecord>;
pub type TripInstance = Instance<TripRecord>;

pub struct Instance<R> {
    name: String,
    source: RecordSource,
    snapshot_path: Option<PathBuf>,
    embedder: Arc<Embedder>,
    corpus: Arc<SharedCorpus<R>>,
    opened_sources: ContentSnapshot,
    reused_snapshot: bool,
}

impl<R: Record + DeserializeOwned> Instance<R> {
    /// Build or restore the instance described by `source_config`.
    ///
    /// `reserved` lists files inside the data directory that must never be
    /// read as sources.
    pub async fn open(
        name: &str,
        source_config: &SourceConfig,
        reserved: &[PathBuf],
        embedder: Arc<Embedder>,
    ) -> Result<Self> {
        let source = RecordSource::new(source_config, reserved)?;
        let snapshot_path = source_config.snapshot_path.clone();
        let Built {
            corpus,
            sources,
            reused_snapshot,
        } = builder::open::<R>(&embedder, &source, snapshot_path.as_deref())
            .await
            .with_context(|| format!("Failed to open [{}] instance", name))?;

        Ok(Self {
            name: name.to_string(),
            source,
            snapshot_path,
            embedder,
            corpus: Arc::new(SharedCorpus::new(corpus)),
            opened_sources: sources,
            reused_snapshot,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &RecordSource {
        &self.source
    }

    pub fn snapshot_path(&self) -> Option<&std::path::Path> {
        self.snapshot_path.as_deref()
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn corpus(&self) -> &Arc<SharedCorpus<R>> {
        &self.corpus
    }

    /// Fingerprints of the files the instance was opened from.
    pub fn opened_sources(&self) -> &ContentSnapshot {
        &self.opened_sources
    }

    pub fn reused_snapshot(&self) -> bool {
        self.reused_snapshot
    }
}

/// Files that live next to sources but are outputs of this program.
pub fn reserved_paths(config: &Config, source: &SourceConfig) -> Vec<PathBuf> {
    let mut reserved = vec![config.evaluation.report_path.clone()];
    reserved.extend(source.snapshot_path.clone());
    reserved
}

pub async fn open_logs(config: &Config, embedder: Arc<Embedder>) -> Result<LogInstance> {
    let logs = config.logs()?;
    Instance::open("logs", logs, &reserved_paths(config, logs), embedder).await
}

pub async fn open_trips(config: &Config, embedder: Arc<Embedder>) -> Result<TripInstance> {
    let trips = config.trips()?;
    Instance::open("trips", trips, &reserved_paths(config, trips), embedder).await
}
