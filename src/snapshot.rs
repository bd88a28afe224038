//! Index snapshot files.
//!
//! The blob layout lives in the core crate; this module only moves it to and
//! from disk. Writes go to a sibling temp file that is then renamed over the
//! target, so a crash mid-write leaves the previous snapshot intact.

use record_rag_core::index::{decode_snapshot, encode_snapshot, IndexSnapshot};
use record_rag_core::{FlatIndex, RagError};
use std::path::{Path, PathBuf};

/// Read a snapshot. A missing file is `Ok(None)`; a corrupt one is an error.
pub fn read_snapshot(path: &Path) -> Result<Option<IndexSnapshot>, RagError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RagError::Snapshot(format!("{}: {}", path.display(), e))),
    };
    decode_snapshot(&bytes).map(Some)
}

pub fn write_snapshot(
    path: &Path,
    index: &FlatIndex,
    source_fingerprint: &str,
) -> Result<(), RagError> {
    let bytes = encode_snapshot(index, source_fingerprint)?;
    let io_err = |e: std::io::Error| RagError::Snapshot(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = temp_path(path);
    std::fs::write(&tmp, &bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        io_err(e)
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
