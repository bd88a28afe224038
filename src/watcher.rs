//! Change Watcher: keeps an instance's corpus in step with its source files.
//!
//! Each cycle fingerprints every source file, compares against the last
//! known fingerprints and processes the files that changed:
//!
//! ```text
//! Idle ──interval──▶ Scanning ──changes──▶ Updating ──▶ Idle
//!                        └────no changes─────────────▶ Idle
//! ```
//!
//! A file's fingerprint is advanced only after its rows are in the published
//! corpus, so a failed file is retried from scratch on the next cycle. Errors
//! that a retry cannot fix ([`RagError::is_retryable`] is false, for example
//! a dimension mismatch) park the file at its current fingerprint instead; it
//! is skipped until its content changes again. Under
//! [`UpdatePolicy::Append`] a retried or edited file appends all of its rows
//! again; [`UpdatePolicy::Rebuild`] re-embeds every source and swaps the
//! result in.

use record_rag_core::{Corpus, Record, RagError, SharedCorpus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::builder;
use crate::config::{UpdatePolicy, WatcherConfig};
use crate::embedding::Embedder;
use crate::instance::Instance;
use crate::snapshot::write_snapshot;
use crate::sources::{read_source_file, ContentSnapshot, RecordSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Idle,
    Scanning,
    Updating,
}

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// Files whose fingerprint differed from the last known one.
    pub changed: Vec<String>,
    /// Changed files now reflected in the corpus.
    pub updated: Vec<String>,
    /// Changed files that will be retried next cycle.
    pub failed: Vec<String>,
    /// Changed files that hit a non-retryable error. They are skipped until
    /// their content changes.
    pub rejected: Vec<String>,
    /// Files that disappeared and were forgotten.
    pub removed: Vec<String>,
    pub rows_appended: usize,
}

impl CycleReport {
    pub fn is_quiet(&self) -> bool {
        self.changed.is_empty()
            && self.removed.is_empty()
            && self.failed.is_empty()
            && self.rejected.is_empty()
    }
}

pub struct Watcher<R> {
    name: String,
    source: RecordSource,
    snapshot_path: Option<PathBuf>,
    embedder: Arc<Embedder>,
    corpus: Arc<SharedCorpus<R>>,
    policy: UpdatePolicy,
    interval: Duration,
    known: ContentSnapshot,
    rejected: ContentSnapshot,
    state: watch::Sender<WatcherState>,
}

impl<R: Record + DeserializeOwned> Watcher<R> {
    /// A watcher for `instance`, starting from the fingerprints it was opened with.
    pub fn new(instance: &Instance<R>, config: &WatcherConfig) -> Self {
        let (state, _) = watch::channel(WatcherState::Idle);
        Self {
            name: instance.name().to_string(),
            source: instance.source().clone(),
            snapshot_path: instance.snapshot_path().map(|p| p.to_path_buf()),
            embedder: Arc::clone(instance.embedder()),
            corpus: Arc::clone(instance.corpus()),
            policy: config.policy,
            interval: Duration::from_secs(config.interval_secs),
            known: instance.opened_sources().clone(),
            rejected: ContentSnapshot::default(),
            state,
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task.
    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    pub fn known(&self) -> &ContentSnapshot {
        &self.known
    }

    /// Run exactly one Scanning (→ Updating) → Idle cycle.
    pub async fn poll_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        self.state.send_replace(WatcherState::Scanning);

        let current = match self.source.scan() {
            Ok(current) => current,
            Err(e) => {
                warn!(instance = %self.name, error = %e, "scan failed, keeping current index");
                report.failed.push(self.source.data_dir().display().to_string());
                self.state.send_replace(WatcherState::Idle);
                return report;
            }
        };

        report.removed = self.known.removed_in(&current);
        for name in &report.removed {
            info!(instance = %self.name, file = %name, "source removed");
            self.known.remove(name);
        }
        for name in self.rejected.removed_in(&current) {
            self.rejected.remove(&name);
        }

        report.changed = self
            .known
            .changed_in(&current)
            .into_iter()
            .filter(|name| self.rejected.get(name) != current.get(name))
            .collect();
        if report.changed.is_empty() {
            debug!(instance = %self.name, "no changes");
            self.state.send_replace(WatcherState::Idle);
            return report;
        }

        info!(instance = %self.name, files = ?report.changed, "changes detected");
        self.state.send_replace(WatcherState::Updating);
        match self.policy {
            UpdatePolicy::Append => self.append_changed(&current, &mut report).await,
            UpdatePolicy::Rebuild => self.rebuild(&current, &mut report).await,
        }
        self.state.send_replace(WatcherState::Idle);
        report
    }

    async fn append_changed(&mut self, current: &ContentSnapshot, report: &mut CycleReport) {
        for name in report.changed.clone() {
            match self.append_file(&name).await {
                Ok(rows) => {
                    info!(instance = %self.name, file = %name, rows, "appended rows");
                    self.rejected.remove(&name);
                    report.rows_appended += rows;
                    report.updated.push(name);
                }
                Err(e) => self.record_failure(name, &e, current, report),
            }
        }
    }

    fn record_failure(
        &mut self,
        name: String,
        err: &RagError,
        current: &ContentSnapshot,
        report: &mut CycleReport,
    ) {
        if err.is_retryable() {
            warn!(instance = %self.name, file = %name, error = %err, "update failed, will retry");
            report.failed.push(name);
            return;
        }
        error!(instance = %self.name, file = %name, error = %err, "update rejected until the file changes");
        if let Some(fingerprint) = current.get(&name) {
            self.rejected.insert(name.clone(), fingerprint.to_string());
        }
        report.rejected.push(name);
    }

    async fn append_file(&mut self, name: &str) -> Result<usize, RagError> {
        let file = read_source_file::<R>(&self.source.path_of(name))?;
        let texts: Vec<String> = file
            .rows
            .iter()
            .map(|r| r.embedding_text().into_owned())
            .collect();
        let vectors = self.embedder.embed(&texts).await?;
        let rows = file.rows.len();
        let published = self.corpus.append(file.rows, &vectors)?;

        let mut next = self.known.clone();
        next.insert(file.name.clone(), file.fingerprint.clone());
        self.persist(&published, &next.fingerprint());
        self.known = next;
        Ok(rows)
    }

    async fn rebuild(&mut self, current: &ContentSnapshot, report: &mut CycleReport) {
        match builder::build::<R>(&self.embedder, &self.source).await {
            Ok((corpus, sources)) => {
                let before = self.corpus.load().len();
                let published = self.corpus.replace(corpus);
                self.persist(&published, &sources.fingerprint());
                info!(instance = %self.name, rows = published.len(), "rebuilt index");
                report.rows_appended = published.len().saturating_sub(before);
                report.updated = report.changed.clone();
                self.known = sources;
                self.rejected = ContentSnapshot::default();
            }
            Err(e) => {
                for name in report.changed.clone() {
                    self.record_failure(name, &e, current, report);
                }
            }
        }
    }

    fn persist(&self, corpus: &Corpus<R>, fingerprint: &str) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        match write_snapshot(path, corpus.index(), fingerprint) {
            Ok(()) => debug!(instance = %self.name, path = %path.display(), "wrote index snapshot"),
            Err(e) => warn!(instance = %self.name, error = %e, "failed to write index snapshot"),
        }
    }

    /// Poll every interval until `shutdown` flips to `true` or its sender is
    /// dropped. Shutdown is only observed while sleeping, so a cycle in
    /// progress always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(instance = %self.name, interval = ?self.interval, policy = ?self.policy, "watcher started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }
            if shutdown.has_changed().is_err() || *shutdown.borrow() {
                break;
            }
            let report = self.poll_once().await;
            if !report.is_quiet() {
                debug!(instance = %self.name, ?report, "cycle finished");
            }
        }
        info!(instance = %self.name, "watcher stopped");
    }
}

/// Open every configured instance and watch it until Ctrl-C.
pub async fn run_watch(config: &crate::config::Config) -> anyhow::Result<()> {
    use crate::instance::{open_logs, open_trips};

    let embedder = Arc::new(Embedder::from_config(&config.embedding)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    if config.logs.is_some() {
        let logs = open_logs(config, embedder.clone()).await?;
        println!("Watching logs: {} rows", logs.corpus().load().len());
        handles.push(tokio::spawn(
            Watcher::new(&logs, &config.watcher).run(shutdown_rx.clone()),
        ));
    }
    if config.trips.is_some() {
        let trips = open_trips(config, embedder.clone()).await?;
        println!("Watching trips: {} rows", trips.corpus().load().len());
        handles.push(tokio::spawn(
            Watcher::new(&trips, &config.watcher).run(shutdown_rx.clone()),
        ));
    }
    if handles.is_empty() {
        anyhow::bail!("Nothing to watch: configure [logs] and/or [trips]");
    }

    tokio::signal::ctrl_c().await?;
    println!("Stopping after the current cycle...");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        handle.await?;
    }
    Ok(())
}
