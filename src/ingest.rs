//! Ingestion pipeline: bytes → text units → chunks → vectors.
//!
//! Steps for one document, each depending on the previous one:
//!
//! 1. Resolve the stored bytes for the filename.
//! 2. Delete any vectors already indexed under that filename.
//! 3. Extract text units (an unsupported extension stops here).
//! 4. Tag every unit with `source = filename`.
//! 5. Chunk the units.
//! 6. Embed the chunks and upsert them into the corpus's index.
//!
//! Steps 2 through 6 run under the per-source lock, so concurrent
//! reprocessing of one file always leaves exactly one load's vectors.
//! [`IngestPipeline::process`] never fails: every [`IngestError`] is logged
//! and mapped to a terminal [`DocumentStatus`].

use std::path::Path;
use std::sync::Arc;

use docqa_core::chunk::RecursiveSplitter;
use docqa_core::embedding::{check_dims, Embedder};
use docqa_core::store::CorpusIndexes;
use tracing::{error, info, warn};

use crate::error::{IngestError, LoadError};
use crate::loader::{self, LoadOutcome};
use crate::locks::SourceLocks;
use crate::models::{Document, DocumentStatus};
use crate::storage::ByteStore;

pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    indexes: CorpusIndexes,
    bytes: Arc<dyn ByteStore>,
    splitter: RecursiveSplitter,
    locks: Arc<SourceLocks>,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        indexes: CorpusIndexes,
        bytes: Arc<dyn ByteStore>,
        splitter: RecursiveSplitter,
        locks: Arc<SourceLocks>,
    ) -> Self {
        Self {
            embedder,
            indexes,
            bytes,
            splitter,
            locks,
        }
    }

    /// Run the pipeline and return the document's new status.
    pub async fn process(&self, doc: &Document) -> DocumentStatus {
        match self.try_process(doc).await {
            Ok(chunks) => {
                info!(
                    filename = %doc.filename,
                    corpus = %doc.corpus,
                    chunks,
                    "document processed"
                );
                DocumentStatus::Processed
            }
            Err(e @ IngestError::UnsupportedFormat(_)) => {
                warn!(filename = %doc.filename, corpus = %doc.corpus, "{}", e);
                e.status()
            }
            Err(e) => {
                error!(
                    filename = %doc.filename,
                    corpus = %doc.corpus,
                    document_id = %doc.id,
                    "processing failed: {}",
                    e
                );
                e.status()
            }
        }
    }

    /// Run the pipeline, returning the number of chunks indexed.
    pub async fn try_process(&self, doc: &Document) -> Result<usize, IngestError> {
        let path = self
            .bytes
            .read_path(&doc.filename)
            .await
            .map_err(IngestError::Storage)?
            .ok_or_else(|| IngestError::NotFound(doc.filename.clone()))?;

        let _guard = self.locks.acquire(doc.corpus, &doc.filename).await;
        let index = self.indexes.get(doc.corpus);

        let removed = index
            .delete_by_source(&doc.filename)
            .await
            .map_err(IngestError::Index)?;
        if !removed.is_empty() {
            info!(
                filename = %doc.filename,
                corpus = %doc.corpus,
                removed = removed.len(),
                "cleared previous vectors"
            );
        }

        let extension = loader::extension_of(Path::new(&doc.filename));
        let outcome = tokio::task::spawn_blocking(move || loader::load(&path, &extension))
            .await
            .map_err(|e| LoadError::Aborted(e.to_string()))??;
        let mut units = match outcome {
            LoadOutcome::Units(units) => units,
            LoadOutcome::Unsupported(ext) => return Err(IngestError::UnsupportedFormat(ext)),
        };

        for unit in &mut units {
            unit.source = Some(doc.filename.clone());
        }

        let chunks = self.splitter.split_units(&units);
        if chunks.is_empty() {
            return Err(IngestError::Empty(doc.filename.clone()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(IngestError::Embedding)?;
        if embeddings.len() != chunks.len() {
            return Err(IngestError::Embedding(anyhow::anyhow!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        check_dims(self.embedder.dims(), &embeddings).map_err(IngestError::Embedding)?;

        index
            .upsert(&doc.filename, &chunks, &embeddings)
            .await
            .map_err(IngestError::Index)?;

        Ok(chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Corpus, UserId};
    use crate::storage::FsByteStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use docqa_core::store::memory::InMemoryIndex;
    use docqa_core::store::VectorIndex;
    use tempfile::TempDir;

    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("connection reset")
        }
    }

    /// Declares one dimensionality and returns another.
    struct MisreportingEmbedder;

    #[async_trait]
    impl Embedder for MisreportingEmbedder {
        fn model_name(&self) -> &str {
            "misreporting"
        }
        fn dims(&self) -> usize {
            3072
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
        }
    }

    /// Returns one vector no matter how many texts it is given.
    struct ShortBatchEmbedder;

    #[async_trait]
    impl Embedder for ShortBatchEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 2.0]])
        }
    }

    struct Fixture {
        _tmp: TempDir,
        bytes: Arc<FsByteStore>,
        public: Arc<InMemoryIndex>,
        private: Arc<InMemoryIndex>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        Fixture {
            bytes: Arc::new(FsByteStore::new(tmp.path().join("uploads"))),
            public: Arc::new(InMemoryIndex::new()),
            private: Arc::new(InMemoryIndex::new()),
            _tmp: tmp,
        }
    }

    fn pipeline(f: &Fixture, embedder: Arc<dyn Embedder>) -> IngestPipeline {
        IngestPipeline::new(
            embedder,
            CorpusIndexes::new(f.public.clone(), f.private.clone()),
            f.bytes.clone(),
            RecursiveSplitter::new(40, 5).unwrap(),
            Arc::new(SourceLocks::new()),
        )
    }

    fn doc(filename: &str, corpus: Corpus) -> Document {
        Document {
            id: "doc-1".to_string(),
            filename: filename.to_string(),
            owner: UserId::new("alice"),
            corpus,
            status: DocumentStatus::NotProcessed,
            uploaded_at: 0,
        }
    }

    #[tokio::test]
    async fn text_file_lands_in_matching_index_only() {
        let f = fixture();
        f.bytes
            .write("notes.txt", b"The sky is blue. Water is wet. Grass is green today.")
            .await
            .unwrap();
        let p = pipeline(&f, Arc::new(LenEmbedder));

        let status = p.process(&doc("notes.txt", Corpus::Private)).await;
        assert_eq!(status, DocumentStatus::Processed);
        assert!(f.private.count().await.unwrap() >= 2);
        assert_eq!(f.public.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reprocessing_leaves_one_generation() {
        let f = fixture();
        f.bytes
            .write("notes.txt", b"The sky is blue. Water is wet. Grass is green today.")
            .await
            .unwrap();
        let p = pipeline(&f, Arc::new(LenEmbedder));
        let d = doc("notes.txt", Corpus::Public);

        let first = p.try_process(&d).await.unwrap();
        let second = p.try_process(&d).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.public.count().await.unwrap(), second);
    }

    #[tokio::test]
    async fn concurrent_reprocessing_leaves_one_generation() {
        let f = fixture();
        f.bytes
            .write("notes.txt", "word ".repeat(200).as_bytes())
            .await
            .unwrap();
        let p = Arc::new(pipeline(&f, Arc::new(LenEmbedder)));
        let d = doc("notes.txt", Corpus::Public);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let p = p.clone();
                let d = d.clone();
                tokio::spawn(async move { p.try_process(&d).await.unwrap() })
            })
            .collect();
        let mut counts = Vec::new();
        for t in tasks {
            counts.push(t.await.unwrap());
        }
        assert_eq!(f.public.count().await.unwrap(), counts[0]);
    }

    #[tokio::test]
    async fn unsupported_extension_maps_to_its_status() {
        let f = fixture();
        f.bytes.write("table.csv", b"a,b\n1,2").await.unwrap();
        let p = pipeline(&f, Arc::new(LenEmbedder));

        let status = p.process(&doc("table.csv", Corpus::Public)).await;
        assert_eq!(status, DocumentStatus::UnsupportedFormat);
        assert_eq!(f.public.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_bytes_is_not_found() {
        let f = fixture();
        let p = pipeline(&f, Arc::new(LenEmbedder));
        let err = p.try_process(&doc("gone.txt", Corpus::Public)).await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
        assert_eq!(
            p.process(&doc("gone.txt", Corpus::Public)).await,
            DocumentStatus::Error
        );
    }

    #[tokio::test]
    async fn embedding_failure_is_error_status() {
        let f = fixture();
        f.bytes.write("notes.txt", b"The sky is blue.").await.unwrap();
        let p = pipeline(&f, Arc::new(FailingEmbedder));

        let err = p.try_process(&doc("notes.txt", Corpus::Public)).await.unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));
        assert_eq!(
            p.process(&doc("notes.txt", Corpus::Public)).await,
            DocumentStatus::Error
        );
    }

    #[tokio::test]
    async fn wrong_dimension_vectors_are_not_indexed() {
        let f = fixture();
        f.bytes.write("notes.txt", b"The sky is blue.").await.unwrap();
        let p = pipeline(&f, Arc::new(MisreportingEmbedder));

        let err = p.try_process(&doc("notes.txt", Corpus::Public)).await.unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));
        assert_eq!(
            p.process(&doc("notes.txt", Corpus::Public)).await,
            DocumentStatus::Error
        );
        assert_eq!(f.public.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn short_embedding_batch_is_error_status() {
        let f = fixture();
        f.bytes
            .write("notes.txt", b"The sky is blue. Water is wet. Grass is green today.")
            .await
            .unwrap();
        let p = pipeline(&f, Arc::new(ShortBatchEmbedder));

        let err = p.try_process(&doc("notes.txt", Corpus::Public)).await.unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));
        assert_eq!(f.public.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_file_is_empty_error() {
        let f = fixture();
        f.bytes.write("blank.txt", b"   \n\n  ").await.unwrap();
        let p = pipeline(&f, Arc::new(LenEmbedder));
        let err = p.try_process(&doc("blank.txt", Corpus::Public)).await.unwrap_err();
        assert!(matches!(err, IngestError::Empty(_)));
    }
}
