//! Document teardown as a recoverable saga.
//!
//! Deleting a document attempts two independent cleanups, the vectors
//! under its filename and its stored bytes. A failure in one never stops
//! the other, and the document record is removed either way. Any step that
//! failed is written to `pending_cleanups` so [`Teardown::reconcile`] can
//! retry it later.

use std::sync::Arc;

use anyhow::Result;
use docqa_core::store::CorpusIndexes;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{error, info, warn};

use crate::documents::DocumentRepo;
use crate::locks::SourceLocks;
use crate::models::{Corpus, Document};
use crate::storage::ByteStore;

/// Outcome of one cleanup step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "detail")]
pub enum Step<T> {
    Done(T),
    Failed(String),
}

impl<T> Step<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }

    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(v) => Step::Done(v),
            Err(e) => Step::Failed(format!("{:#}", e)),
        }
    }

    fn error(&self) -> Option<&str> {
        match self {
            Step::Done(_) => None,
            Step::Failed(e) => Some(e),
        }
    }
}

/// What a document deletion actually did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownReport {
    pub document_id: String,
    pub filename: String,
    pub corpus: Corpus,
    /// Number of vectors removed.
    pub embeddings: Step<usize>,
    /// Whether stored bytes existed and were removed.
    pub bytes: Step<bool>,
    /// Id of the `pending_cleanups` row written for failed steps.
    pub pending_cleanup: Option<i64>,
}

impl TeardownReport {
    pub fn is_complete(&self) -> bool {
        self.embeddings.is_done() && self.bytes.is_done()
    }
}

/// A failed teardown step awaiting retry.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCleanup {
    pub id: i64,
    pub filename: String,
    pub corpus: Corpus,
    pub embeddings_pending: bool,
    pub bytes_pending: bool,
    pub last_error: Option<String>,
    pub created_at: i64,
}

/// Access to the `pending_cleanups` table.
#[derive(Clone)]
pub struct CleanupQueue {
    pool: SqlitePool,
}

impl CleanupQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        filename: &str,
        corpus: Corpus,
        embeddings_pending: bool,
        bytes_pending: bool,
        last_error: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO pending_cleanups (filename, corpus, embeddings_pending, bytes_pending, last_error, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(filename)
        .bind(corpus.as_str())
        .bind(embeddings_pending)
        .bind(bytes_pending)
        .bind(last_error)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// All pending rows, oldest first.
    pub async fn list(&self) -> Result<Vec<PendingCleanup>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, corpus, embeddings_pending, bytes_pending, last_error, created_at
            FROM pending_cleanups
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PendingCleanup> {
                let corpus: String = row.get("corpus");
                Ok(PendingCleanup {
                    id: row.get("id"),
                    filename: row.get("filename"),
                    corpus: corpus.parse()?,
                    embeddings_pending: row.get("embeddings_pending"),
                    bytes_pending: row.get("bytes_pending"),
                    last_error: row.get("last_error"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn update(
        &self,
        id: i64,
        embeddings_pending: bool,
        bytes_pending: bool,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE pending_cleanups SET embeddings_pending = ?, bytes_pending = ?, last_error = ? WHERE id = ?",
        )
        .bind(embeddings_pending)
        .bind(bytes_pending)
        .bind(last_error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_cleanups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM pending_cleanups")
            .fetch_one(&self.pool)
            .await?)
    }
}

/// Runs document deletion and reconciliation.
pub struct Teardown {
    indexes: CorpusIndexes,
    bytes: Arc<dyn ByteStore>,
    locks: Arc<SourceLocks>,
    documents: DocumentRepo,
    cleanups: CleanupQueue,
}

impl Teardown {
    pub fn new(
        indexes: CorpusIndexes,
        bytes: Arc<dyn ByteStore>,
        locks: Arc<SourceLocks>,
        documents: DocumentRepo,
        cleanups: CleanupQueue,
    ) -> Self {
        Self {
            indexes,
            bytes,
            locks,
            documents,
            cleanups,
        }
    }

    pub fn cleanups(&self) -> &CleanupQueue {
        &self.cleanups
    }

    /// Delete `doc`'s vectors, bytes, and record.
    ///
    /// Only a failure to remove the record itself is returned as an error.
    pub async fn delete(&self, doc: &Document) -> Result<TeardownReport> {
        let embeddings = Step::from_result(self.remove_vectors(&doc.filename, doc.corpus).await);
        if let Some(e) = embeddings.error() {
            error!(filename = %doc.filename, corpus = %doc.corpus, "vector cleanup failed: {}", e);
        }

        let bytes = Step::from_result(self.bytes.delete(&doc.filename).await);
        if let Some(e) = bytes.error() {
            error!(filename = %doc.filename, "byte cleanup failed: {}", e);
        }

        let mut pending_cleanup = None;
        if !embeddings.is_done() || !bytes.is_done() {
            let last_error = embeddings.error().or(bytes.error());
            match self
                .cleanups
                .record(
                    &doc.filename,
                    doc.corpus,
                    !embeddings.is_done(),
                    !bytes.is_done(),
                    last_error,
                )
                .await
            {
                Ok(id) => {
                    warn!(filename = %doc.filename, cleanup_id = id, "queued cleanup for retry");
                    pending_cleanup = Some(id);
                }
                Err(e) => {
                    error!(filename = %doc.filename, "failed to queue cleanup: {:#}", e);
                }
            }
        }

        self.documents.delete(&doc.id).await?;
        info!(
            document_id = %doc.id,
            filename = %doc.filename,
            corpus = %doc.corpus,
            "document deleted"
        );

        Ok(TeardownReport {
            document_id: doc.id.clone(),
            filename: doc.filename.clone(),
            corpus: doc.corpus,
            embeddings,
            bytes,
            pending_cleanup,
        })
    }

    /// Retry every pending cleanup. Returns how many were fully resolved.
    ///
    /// A step is skipped, not retried, once the filename belongs to a live
    /// document again: its vectors or bytes are no longer orphans.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut resolved = 0;
        for pending in self.cleanups.list().await? {
            let mut embeddings_pending = pending.embeddings_pending;
            let mut bytes_pending = pending.bytes_pending;
            let mut last_error: Option<String> = None;

            if embeddings_pending {
                if self
                    .documents
                    .has_filename(&pending.filename, Some(pending.corpus))
                    .await?
                {
                    embeddings_pending = false;
                } else {
                    match self.remove_vectors(&pending.filename, pending.corpus).await {
                        Ok(_) => embeddings_pending = false,
                        Err(e) => last_error = Some(format!("{:#}", e)),
                    }
                }
            }

            if bytes_pending {
                if self.documents.has_filename(&pending.filename, None).await? {
                    bytes_pending = false;
                } else {
                    match self.bytes.delete(&pending.filename).await {
                        Ok(_) => bytes_pending = false,
                        Err(e) => last_error = Some(format!("{:#}", e)),
                    }
                }
            }

            if embeddings_pending || bytes_pending {
                warn!(
                    cleanup_id = pending.id,
                    filename = %pending.filename,
                    "cleanup still pending: {}",
                    last_error.as_deref().unwrap_or("unknown error")
                );
                self.cleanups
                    .update(pending.id, embeddings_pending, bytes_pending, last_error.as_deref())
                    .await?;
            } else {
                info!(cleanup_id = pending.id, filename = %pending.filename, "cleanup resolved");
                self.cleanups.resolve(pending.id).await?;
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Remove vectors for `filename` unless a live document in `corpus` still uses it.
    ///
    /// Covers processing runs that finish after their document was deleted.
    pub async fn discard_orphaned_vectors(&self, filename: &str, corpus: Corpus) -> Result<usize> {
        if self.documents.has_filename(filename, Some(corpus)).await? {
            return Ok(0);
        }
        let removed = self.remove_vectors(filename, corpus).await?;
        if removed > 0 {
            warn!(filename, corpus = %corpus, removed, "discarded vectors of a deleted document");
        }
        Ok(removed)
    }

    async fn remove_vectors(&self, filename: &str, corpus: Corpus) -> Result<usize> {
        let _guard = self.locks.acquire(corpus, filename).await;
        let removed = self.indexes.get(corpus).delete_by_source(filename).await?;
        Ok(removed.len())
    }
}
