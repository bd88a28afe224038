//! Source discovery, CSV reading and content fingerprints.
//!
//! An instance's sources are the files directly inside its `data_dir` that
//! match the include globs and none of the exclude globs. Files are always
//! visited in file-name order so that row positions are reproducible.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use record_rag_core::RagError;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::SourceConfig;

/// Where an instance's CSV files come from.
#[derive(Debug, Clone)]
pub struct RecordSource {
    data_dir: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    /// Files never treated as sources (the evaluation report, the snapshot).
    reserved: Vec<PathBuf>,
}

/// One file's parsed rows plus the fingerprint of the bytes they came from.
#[derive(Debug, Clone)]
pub struct SourceFile<R> {
    pub name: String,
    pub fingerprint: String,
    pub rows: Vec<R>,
}

impl RecordSource {
    pub fn new(config: &SourceConfig, reserved: &[PathBuf]) -> Result<Self> {
        Ok(Self {
            data_dir: config.data_dir.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&config.exclude_globs)?,
            reserved: reserved.iter().map(|p| comparable(p)).collect(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Matching files, sorted by file name.
    pub fn discover(&self) -> std::result::Result<Vec<PathBuf>, RagError> {
        if !self.data_dir.is_dir() {
            return Err(RagError::source_read(
                self.data_dir.display(),
                "data directory does not exist",
            ));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.data_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| RagError::source_read(self.data_dir.display(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if self.exclude.is_match(name.as_ref()) || !self.include.is_match(name.as_ref()) {
                continue;
            }
            let path = entry.into_path();
            if self.reserved.contains(&comparable(&path)) {
                continue;
            }
            files.push(path);
        }
        Ok(files)
    }

    /// Fingerprint every matching file without parsing it.
    pub fn scan(&self) -> std::result::Result<ContentSnapshot, RagError> {
        let mut snapshot = ContentSnapshot::default();
        for path in self.discover()? {
            let bytes = std::fs::read(&path).map_err(|e| RagError::source_read(path.display(), e))?;
            snapshot.insert(file_name(&path), fingerprint_bytes(&bytes));
        }
        Ok(snapshot)
    }

    /// Read and parse every matching file, in order.
    pub fn load_all<R: DeserializeOwned>(&self) -> std::result::Result<Vec<SourceFile<R>>, RagError> {
        self.discover()?
            .iter()
            .map(|path| read_source_file(path))
            .collect()
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

/// Read one CSV file, fingerprinting the same bytes that are parsed.
pub fn read_source_file<R: DeserializeOwned>(
    path: &Path,
) -> std::result::Result<SourceFile<R>, RagError> {
    let bytes = std::fs::read(path).map_err(|e| RagError::source_read(path.display(), e))?;
    let rows = parse_csv(&bytes).map_err(|e| RagError::source_read(path.display(), e))?;
    Ok(SourceFile {
        name: file_name(path),
        fingerprint: fingerprint_bytes(&bytes),
        rows,
    })
}

fn parse_csv<R: DeserializeOwned>(bytes: &[u8]) -> std::result::Result<Vec<R>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes)
        .deserialize()
        .collect()
}

/// Hex SHA-256 of raw bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// File name → content fingerprint for every source file of an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSnapshot {
    files: BTreeMap<String, String>,
}

impl ContentSnapshot {
    pub fn from_files<R>(files: &[SourceFile<R>]) -> Self {
        Self {
            files: files
                .iter()
                .map(|f| (f.name.clone(), f.fingerprint.clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: String, fingerprint: String) {
        self.files.insert(name, fingerprint);
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.files.remove(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in `current` that are new or whose fingerprint differs from ours.
    pub fn changed_in(&self, current: &ContentSnapshot) -> Vec<String> {
        current
            .files
            .iter()
            .filter(|(name, fp)| self.files.get(*name) != Some(*fp))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Files we know about that no longer exist in `current`.
    pub fn removed_in(&self, current: &ContentSnapshot) -> Vec<String> {
        self.files
            .keys()
            .filter(|name| !current.files.contains_key(*name))
            .cloned()
            .collect()
    }

    /// One hash over the sorted `name=fingerprint` pairs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, fp) in &self.files {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(fp.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn comparable(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        // The reserved file may not exist yet; canonicalize its directory instead.
        match (path.parent(), path.file_name()) {
            (Some(dir), Some(name)) => std::fs::canonicalize(if dir.as_os_str().is_empty() {
                Path::new(".")
            } else {
                dir
            })
            .map(|d| d.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
            _ => path.to_path_buf(),
        }
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
