//! Index Builder: source files → aligned corpus.
//!
//! [`build`] always embeds from scratch. [`open`] is the startup path: it
//! reuses a persisted index snapshot when the snapshot provably matches the
//! current sources and falls back to [`build`] otherwise.

use record_rag_core::{Corpus, Record, RagError, VectorIndex};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::snapshot::{read_snapshot, write_snapshot};
use crate::sources::{ContentSnapshot, RecordSource, SourceFile};

/// Result of opening an instance.
#[derive(Debug)]
pub struct Built<R> {
    pub corpus: Corpus<R>,
    pub sources: ContentSnapshot,
    /// Whether vectors came from the snapshot instead of the embedder.
    pub reused_snapshot: bool,
}

/// Read every source file, embed all rows, and return the corpus together
/// with the fingerprints of the files it was built from.
///
/// Any unreadable file aborts the whole build.
pub async fn build<R>(
    embedder: &Embedder,
    source: &RecordSource,
) -> Result<(Corpus<R>, ContentSnapshot), RagError>
where
    R: Record + DeserializeOwned,
{
    let files: Vec<SourceFile<R>> = source.load_all()?;
    let sources = ContentSnapshot::from_files(&files);
    let corpus = embed_rows(embedder, files.into_iter().flat_map(|f| f.rows).collect()).await?;
    Ok((corpus, sources))
}

/// Embed `rows` into a fresh corpus of the embedder's dimension.
pub async fn embed_rows<R: Record>(embedder: &Embedder, rows: Vec<R>) -> Result<Corpus<R>, RagError> {
    let texts: Vec<String> = rows.iter().map(|r| r.embedding_text().into_owned()).collect();
    let vectors = embedder.embed(&texts).await?;
    let mut corpus = Corpus::empty(embedder.dims());
    corpus.append(rows, &vectors)?;
    Ok(corpus)
}

/// Build, or restore from `snapshot_path` when it is still fresh, and
/// (re)write the snapshot after a full build.
pub async fn open<R>(
    embedder: &Embedder,
    source: &RecordSource,
    snapshot_path: Option<&Path>,
) -> Result<Built<R>, RagError>
where
    R: Record + DeserializeOwned,
{
    let files: Vec<SourceFile<R>> = source.load_all()?;
    let sources = ContentSnapshot::from_files(&files);
    let rows: Vec<R> = files.into_iter().flat_map(|f| f.rows).collect();
    let fingerprint = sources.fingerprint();

    if let Some(path) = snapshot_path {
        match read_snapshot(path) {
            Ok(Some(snap))
                if snap.index.dimension() == embedder.dims()
                    && snap.index.count() == rows.len()
                    && snap.source_fingerprint == fingerprint =>
            {
                info!(path = %path.display(), rows = rows.len(), "reusing index snapshot");
                return Ok(Built {
                    corpus: Corpus::from_parts(snap.index, rows)?,
                    sources,
                    reused_snapshot: true,
                });
            }
            Ok(Some(_)) => info!(path = %path.display(), "index snapshot is stale, rebuilding"),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "ignoring unreadable snapshot"),
        }
    }

    let corpus = embed_rows(embedder, rows).await?;
    info!(
        rows = corpus.len(),
        dimension = corpus.dimension(),
        files = sources.len(),
        "built index"
    );

    if let Some(path) = snapshot_path {
        match write_snapshot(path, corpus.index(), &fingerprint) {
            Ok(()) => info!(path = %path.display(), "wrote index snapshot"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write index snapshot"),
        }
    }

    Ok(Built {
        corpus,
        sources,
        reused_snapshot: false,
    })
}

/// Which instances `rrag build` should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    Logs,
    Trips,
    All,
}

pub async fn run_build(config: &crate::config::Config, target: BuildTarget) -> anyhow::Result<()> {
    use crate::instance::{open_logs, open_trips};
    use std::sync::Arc;

    let embedder = Arc::new(Embedder::from_config(&config.embedding)?);
    let want_logs = target != BuildTarget::Trips && (target == BuildTarget::Logs || config.logs.is_some());
    let want_trips = target != BuildTarget::Logs && (target == BuildTarget::Trips || config.trips.is_some());
    if !want_logs && !want_trips {
        anyhow::bail!("Nothing to build: configure [logs] and/or [trips]");
    }

    if want_logs {
        let logs = open_logs(config, embedder.clone()).await?;
        print_built(logs.name(), &logs.corpus().load(), logs.reused_snapshot());
    }
    if want_trips {
        let trips = open_trips(config, embedder.clone()).await?;
        print_built(trips.name(), &trips.corpus().load(), trips.reused_snapshot());
    }
    Ok(())
}

fn print_built<R: Record>(name: &str, corpus: &Corpus<R>, reused: bool) {
    println!(
        "{}: {} rows, dimension {} ({})",
        name,
        corpus.len(),
        corpus.dimension(),
        if reused { "snapshot reused" } else { "built" }
    );
}
