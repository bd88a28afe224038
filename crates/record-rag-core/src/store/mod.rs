//! Corpus: a vector index paired with its row store.
//!
//! [`Corpus`] keeps `rows.len() == index.count()` by construction: its fields
//! are private and [`Corpus::append`] validates a batch completely before
//! touching either half.
//!
//! [`SharedCorpus`] is the handle shared between request handlers and the
//! change watcher. Readers take an immutable `Arc<Corpus>` snapshot with
//! [`SharedCorpus::load`]; the single writer builds the next corpus off to
//! the side and swaps it in, so no reader can observe a half-applied update.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::{RagError, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::models::Record;

/// An index and the rows it was built from, aligned by position.
#[derive(Debug, Clone)]
pub struct Corpus<R, I = FlatIndex> {
    index: I,
    rows: Vec<R>,
    version: u64,
}

impl<R: Record, I: VectorIndex> Corpus<R, I> {
    /// An empty corpus accepting vectors of `dimension` components.
    pub fn empty(dimension: usize) -> Self {
        Self {
            index: I::create(dimension),
            rows: Vec::new(),
            version: 0,
        }
    }

    /// Pair an existing index with rows, e.g. when restoring a snapshot.
    pub fn from_parts(index: I, rows: Vec<R>) -> Result<Self> {
        if index.count() != rows.len() {
            return Err(RagError::MisalignedBatch {
                rows: rows.len(),
                vectors: index.count(),
            });
        }
        Ok(Self {
            index,
            rows,
            version: 0,
        })
    }

    /// Append rows and their vectors as one unit.
    ///
    /// On error nothing is appended.
    pub fn append(&mut self, rows: Vec<R>, vectors: &[Vec<f32>]) -> Result<()> {
        if rows.len() != vectors.len() {
            return Err(RagError::MisalignedBatch {
                rows: rows.len(),
                vectors: vectors.len(),
            });
        }
        self.index.add(vectors)?;
        self.rows.extend(rows);
        self.version += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Incremented on every append or replacement.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn row(&self, position: usize) -> Option<&R> {
        self.rows.get(position)
    }
}

/// Versioned, swappable corpus handle with a single writer.
#[derive(Debug)]
pub struct SharedCorpus<R, I = FlatIndex> {
    current: RwLock<Arc<Corpus<R, I>>>,
    writer: Mutex<()>,
}

impl<R: Record, I: VectorIndex> SharedCorpus<R, I> {
    pub fn new(corpus: Corpus<R, I>) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
            writer: Mutex::new(()),
        }
    }

    /// The current consistent snapshot.
    ///
    /// Holding the returned `Arc` never blocks the writer; the snapshot
    /// simply stops being current after the next swap.
    pub fn load(&self) -> Arc<Corpus<R, I>> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Append to a copy of the current corpus and publish it.
    ///
    /// Returns the newly published snapshot. On error the current corpus
    /// stays published unchanged.
    pub fn append(&self, rows: Vec<R>, vectors: &[Vec<f32>]) -> Result<Arc<Corpus<R, I>>> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Corpus::clone(&self.load());
        next.append(rows, vectors)?;
        Ok(self.publish(next))
    }

    /// Publish a wholly rebuilt corpus.
    pub fn replace(&self, mut corpus: Corpus<R, I>) -> Arc<Corpus<R, I>> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        corpus.version = self.load().version + 1;
        self.publish(corpus)
    }

    fn publish(&self, corpus: Corpus<R, I>) -> Arc<Corpus<R, I>> {
        let next = Arc::new(corpus);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&next);
        next
    }
}
