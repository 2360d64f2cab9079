//! In-memory [`VectorIndex`] implementation for tests and ephemeral use.
//!
//! Vectors live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Chunk, SearchHit};
use crate::search::{top_k, Candidate};

use super::{check_batch, VectorIndex};

struct StoredVector {
    id: String,
    source: String,
    page: Option<u32>,
    text: String,
    vector: Vec<f32>,
}

impl StoredVector {
    fn candidate(&self) -> Candidate<'_> {
        Candidate {
            id: &self.id,
            text: &self.text,
            source: &self.source,
            page: self.page,
            vector: &self.vector,
        }
    }
}

/// Vector index held entirely in process memory.
pub struct InMemoryIndex {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(
        &self,
        source: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        check_batch(chunks, embeddings)?;
        let mut vecs = self.vectors.write().unwrap_or_else(PoisonError::into_inner);
        vecs.retain(|sv| sv.source != source);

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = Uuid::new_v4().to_string();
            vecs.push(StoredVector {
                id: id.clone(),
                source: source.to_string(),
                page: chunk.page,
                text: chunk.text.clone(),
                vector: embedding.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete_by_source(&self, source: &str) -> Result<Vec<String>> {
        let mut vecs = self.vectors.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = Vec::new();
        vecs.retain(|sv| {
            if sv.source == source {
                removed.push(sv.id.clone());
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let vecs = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        Ok(top_k(query, vecs.iter().map(StoredVector::candidate), k))
    }

    async fn search_sources(
        &self,
        query: &[f32],
        k: usize,
        sources: &[String],
    ) -> Result<Vec<SearchHit>> {
        let vecs = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        let candidates = vecs
            .iter()
            .filter(|sv| sources.iter().any(|s| s == &sv.source))
            .map(StoredVector::candidate);
        Ok(top_k(query, candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            source: source.to_string(),
            page: None,
            chunk_index: index,
            text: text.to_string(),
            hash: format!("h{}", index),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_previous_vectors_for_source() {
        let index = InMemoryIndex::new();
        let chunks = vec![chunk("a.txt", 0, "one"), chunk("a.txt", 1, "two")];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];

        let first = index.upsert("a.txt", &chunks, &embeddings).await.unwrap();
        let mut second = index.upsert("a.txt", &chunks, &embeddings).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(index.count().await.unwrap(), 2);
        let mut removed = index.delete_by_source("a.txt").await.unwrap();
        removed.sort();
        second.sort();
        assert_eq!(removed, second);
    }

    #[tokio::test]
    async fn delete_by_source_only_touches_that_source() {
        let index = InMemoryIndex::new();
        index
            .upsert("a.txt", &[chunk("a.txt", 0, "a")], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        index
            .upsert("b.txt", &[chunk("b.txt", 0, "b")], &[vec![0.0, 1.0]])
            .await
            .unwrap();

        let removed = index.delete_by_source("a.txt").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.delete_by_source("missing.txt").await.unwrap().is_empty());

        let hits = index.search(&[1.0, 0.0], 3).await.unwrap();
        assert!(hits.iter().all(|h| h.source == "b.txt"));
    }

    #[tokio::test]
    async fn search_sources_filters_by_filename() {
        let index = InMemoryIndex::new();
        index
            .upsert("mine.txt", &[chunk("mine.txt", 0, "mine")], &[vec![0.5, 0.5]])
            .await
            .unwrap();
        index
            .upsert("theirs.txt", &[chunk("theirs.txt", 0, "theirs")], &[vec![1.0, 0.0]])
            .await
            .unwrap();

        let hits = index
            .search_sources(&[1.0, 0.0], 3, &["mine.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "mine.txt");
        assert!(index.search_sources(&[1.0, 0.0], 3, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatched_batch_is_rejected() {
        let index = InMemoryIndex::new();
        let err = index
            .upsert("a.txt", &[chunk("a.txt", 0, "a")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mismatch"));
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
