//! Vector index over unit-norm embeddings.
//!
//! [`VectorIndex`] is the seam: the only hard contracts are the dimension
//! fixed at creation and the top-k query. [`FlatIndex`] implements it with an
//! exact brute-force inner-product scan, which is plenty for a few thousand
//! rows. The index is append-only; entries are never updated or removed.
//!
//! The module also owns the snapshot codec used to persist an index:
//!
//! ```text
//! "RRAGIDX1" | u32 dimension | u64 count | u16 len | fingerprint | count × dimension × f32
//! ```
//!
//! All integers and floats are little-endian.

use std::cmp::Ordering;

use crate::embedding::{blob_to_vec, inner_product, vec_to_blob};
use crate::error::{RagError, Result};

const SNAPSHOT_MAGIC: &[u8; 8] = b"RRAGIDX1";
const SNAPSHOT_HEADER_LEN: usize = 8 + 4 + 8 + 2;

/// A single search match: the row position and its similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// Descending score, then ascending position.
pub fn rank_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

/// Append-only similarity index.
pub trait VectorIndex: Clone + Send + Sync + 'static {
    /// Create an empty index that accepts vectors of `dimension` components.
    fn create(dimension: usize) -> Self;

    /// The dimension fixed at creation.
    fn dimension(&self) -> usize;

    /// Number of stored vectors.
    fn count(&self) -> usize;

    /// Append vectors in order.
    ///
    /// Either every vector is appended or, on [`RagError::DimensionMismatch`],
    /// none is.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

    /// Up to `k` best matches for `query`, ordered by [`rank_order`].
    ///
    /// An empty index yields an empty result.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}

/// Exact inner-product index with contiguous storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// The stored vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn create(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        if self.dimension == 0 {
            return 0;
        }
        self.data.len() / self.dimension
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for v in vectors {
            self.check_dimension(v.len())?;
        }
        self.data.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query.len())?;
        if k == 0 || self.data.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                score: inner_product(query, v),
            })
            .collect();

        neighbors.sort_by(rank_order);
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

/// A decoded index snapshot together with the source fingerprint it was
/// built from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub index: FlatIndex,
    pub source_fingerprint: String,
}

/// Serialize an index and its source fingerprint.
pub fn encode_snapshot(index: &FlatIndex, source_fingerprint: &str) -> Result<Vec<u8>> {
    let fp = source_fingerprint.as_bytes();
    let fp_len = u16::try_from(fp.len())
        .map_err(|_| RagError::Snapshot("source fingerprint too long".to_string()))?;
    let dimension = u32::try_from(index.dimension)
        .map_err(|_| RagError::Snapshot("dimension exceeds u32".to_string()))?;

    let mut out = Vec::with_capacity(SNAPSHOT_HEADER_LEN + fp.len() + index.data.len() * 4);
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.extend_from_slice(&dimension.to_le_bytes());
    out.extend_from_slice(&(index.count() as u64).to_le_bytes());
    out.extend_from_slice(&fp_len.to_le_bytes());
    out.extend_from_slice(fp);
    out.extend_from_slice(&vec_to_blob(&index.data));
    Ok(out)
}

/// Deserialize a snapshot produced by [`encode_snapshot`].
pub fn decode_snapshot(bytes: &[u8]) -> Result<IndexSnapshot> {
    if bytes.len() < SNAPSHOT_HEADER_LEN || &bytes[..8] != SNAPSHOT_MAGIC {
        return Err(RagError::Snapshot("missing header".to_string()));
    }
    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;
    let fp_len = u16::from_le_bytes([bytes[20], bytes[21]]) as usize;

    let fp_end = SNAPSHOT_HEADER_LEN + fp_len;
    let fingerprint = bytes
        .get(SNAPSHOT_HEADER_LEN..fp_end)
        .ok_or_else(|| RagError::Snapshot("truncated fingerprint".to_string()))?;
    let source_fingerprint = String::from_utf8(fingerprint.to_vec())
        .map_err(|_| RagError::Snapshot("fingerprint is not UTF-8".to_string()))?;

    let payload = &bytes[fp_end..];
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| RagError::Snapshot("size overflow".to_string()))?;
    if payload.len() != expected {
        return Err(RagError::Snapshot(format!(
            "expected {} payload bytes, found {}",
            expected,
            payload.len()
        )));
    }
    if dimension == 0 && count > 0 {
        return Err(RagError::Snapshot("zero dimension".to_string()));
    }

    Ok(IndexSnapshot {
        index: FlatIndex {
            dimension,
            data: blob_to_vec(payload),
        },
        source_fingerprint,
    })
}
