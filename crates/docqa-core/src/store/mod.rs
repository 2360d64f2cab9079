//! Vector index abstraction.
//!
//! A [`VectorIndex`] holds one corpus worth of embedded chunks. The
//! application keeps two independent instances (public and private);
//! a chunk written to one is never visible to a search on the other.
//!
//! Chunks are keyed back to their document only by source filename, so
//! every write and delete is scoped by `source`.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Corpus, SearchHit};

/// Persistent nearest-neighbor store for embedded chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Replace all vectors for a source |
/// | [`delete_by_source`](VectorIndex::delete_by_source) | Remove every vector for a source |
/// | [`search`](VectorIndex::search) | Top-k cosine search over the whole index |
/// | [`search_sources`](VectorIndex::search_sources) | Top-k search restricted to some sources |
/// | [`count`](VectorIndex::count) | Total number of stored vectors |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store `chunks` with their `embeddings`, replacing anything already
    /// stored for `source`. Re-running with the same input never leaves
    /// duplicate vectors behind.
    ///
    /// This is stronger than insert-only and is required of every backend:
    /// ingestion relies on it to keep one generation of vectors per source.
    /// An append-only implementation does not satisfy this trait.
    ///
    /// Returns the new vector ids in chunk order.
    async fn upsert(
        &self,
        source: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>>;

    /// Remove every vector whose source is `source`. Returns the removed ids;
    /// an unknown source yields an empty list.
    async fn delete_by_source(&self, source: &str) -> Result<Vec<String>>;

    /// Return up to `k` hits, best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Like [`search`](VectorIndex::search) but only over vectors whose
    /// source is in `sources`. An empty `sources` yields no hits.
    async fn search_sources(
        &self,
        query: &[f32],
        k: usize,
        sources: &[String],
    ) -> Result<Vec<SearchHit>>;

    async fn count(&self) -> Result<usize>;
}

/// The public and private indices, selected by [`Corpus`].
#[derive(Clone)]
pub struct CorpusIndexes {
    public: Arc<dyn VectorIndex>,
    private: Arc<dyn VectorIndex>,
}

impl CorpusIndexes {
    pub fn new(public: Arc<dyn VectorIndex>, private: Arc<dyn VectorIndex>) -> Self {
        Self { public, private }
    }

    pub fn get(&self, corpus: Corpus) -> &dyn VectorIndex {
        match corpus {
            Corpus::Public => self.public.as_ref(),
            Corpus::Private => self.private.as_ref(),
        }
    }
}

/// Check that chunk and embedding batches line up before writing.
pub fn check_batch(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
    anyhow::ensure!(
        chunks.len() == embeddings.len(),
        "chunk/embedding count mismatch: {} chunks, {} embeddings",
        chunks.len(),
        embeddings.len()
    );
    if let Some(first) = embeddings.first() {
        let dims = first.len();
        anyhow::ensure!(dims > 0, "embeddings must not be empty vectors");
        anyhow::ensure!(
            embeddings.iter().all(|e| e.len() == dims),
            "embeddings have inconsistent dimensions"
        );
    }
    Ok(())
}
