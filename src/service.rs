//! The `DocQa` service facade.
//!
//! Owns every long-lived handle (relational pool, both vector indexes,
//! byte store, embedder, generator) and exposes the caller-facing
//! operations. Handles are built once in [`DocQa::open`] or injected through
//! [`DocQa::from_parts`]; nothing is global.
//!
//! File-management operations propagate explicit [`ServiceError`]s. Chat
//! operations only reject bad requests; backend failures become apologies.

use std::sync::Arc;

use anyhow::Result;
use docqa_core::chunk::RecursiveSplitter;
use docqa_core::embedding::Embedder;
use docqa_core::generation::Generator;
use docqa_core::store::CorpusIndexes;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::answer::{Answer, AnswerPipeline, PrivateAnswer, Scope};
use crate::config::{ChunkingConfig, Config, RetrievalConfig};
use crate::conversations::ConversationLog;
use crate::db;
use crate::documents::DocumentRepo;
use crate::embedding::create_embedder;
use crate::error::{ServiceError, ServiceResult};
use crate::generation::create_generator;
use crate::ingest::IngestPipeline;
use crate::lifecycle::{CleanupQueue, Teardown, TeardownReport};
use crate::locks::SourceLocks;
use crate::migrate::migrate_pool;
use crate::models::{Conversation, Corpus, Document, DocumentStatus, UserId};
use crate::sqlite_index::SqliteIndex;
use crate::stats::{CorpusStats, DocumentCount, Stats};
use crate::storage::{is_valid_filename, ByteStore, FsByteStore};

/// Everything [`DocQa`] needs, for callers that build their own backends.
pub struct Parts {
    pub pool: SqlitePool,
    pub indexes: CorpusIndexes,
    pub bytes: Arc<dyn ByteStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
}

pub struct DocQa {
    documents: DocumentRepo,
    conversations: ConversationLog,
    bytes: Arc<dyn ByteStore>,
    indexes: CorpusIndexes,
    ingest: IngestPipeline,
    teardown: Teardown,
    answers: AnswerPipeline,
}

impl DocQa {
    /// Connect to the stores named in `config`, creating and migrating them
    /// as needed, and build the configured providers.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;

        let public = SqliteIndex::open(&config.index.public_dir, &config.index.collection).await?;
        let private =
            SqliteIndex::open(&config.index.private_dir, &config.index.collection).await?;

        Self::from_parts(Parts {
            pool,
            indexes: CorpusIndexes::new(Arc::new(public), Arc::new(private)),
            bytes: Arc::new(FsByteStore::new(&config.storage.uploads_dir)),
            embedder: create_embedder(&config.embedding)?,
            generator: create_generator(&config.generation)?,
            chunking: config.chunking.clone(),
            retrieval: config.retrieval.clone(),
        })
    }

    /// Assemble the service from existing handles. The pool must already be
    /// migrated.
    pub fn from_parts(parts: Parts) -> Result<Self> {
        let Parts {
            pool,
            indexes,
            bytes,
            embedder,
            generator,
            chunking,
            retrieval,
        } = parts;

        let splitter = RecursiveSplitter::new(chunking.chunk_size, chunking.chunk_overlap)?;
        let locks = Arc::new(SourceLocks::new());
        let documents = DocumentRepo::new(pool.clone());
        let conversations = ConversationLog::new(pool.clone());

        let ingest = IngestPipeline::new(
            embedder.clone(),
            indexes.clone(),
            bytes.clone(),
            splitter,
            locks.clone(),
        );
        let teardown = Teardown::new(
            indexes.clone(),
            bytes.clone(),
            locks,
            documents.clone(),
            CleanupQueue::new(pool),
        );
        let answers = AnswerPipeline::new(
            embedder,
            generator,
            indexes.clone(),
            documents.clone(),
            conversations.clone(),
            retrieval,
        );

        Ok(Self {
            documents,
            conversations,
            bytes,
            indexes,
            ingest,
            teardown,
            answers,
        })
    }

    /// The caller's documents, newest upload first.
    pub async fn list_documents(&self, user: &UserId) -> ServiceResult<Vec<Document>> {
        Ok(self.documents.list_for_owner(user).await?)
    }

    /// Store `bytes` under `filename` and record a `not-processed` document.
    ///
    /// An existing file with the same name is overwritten.
    pub async fn create_document(
        &self,
        user: &UserId,
        filename: &str,
        bytes: &[u8],
        corpus: Corpus,
    ) -> ServiceResult<Document> {
        if !is_valid_filename(filename) {
            return Err(ServiceError::InvalidFilename(filename.to_string()));
        }
        self.bytes.write(filename, bytes).await?;
        let doc = self.documents.insert(user, filename, corpus).await?;
        info!(
            document_id = %doc.id,
            filename = %doc.filename,
            corpus = %doc.corpus,
            owner = %user,
            bytes = bytes.len(),
            "document uploaded"
        );
        Ok(doc)
    }

    /// Delete a document the caller owns, along with its vectors and bytes.
    pub async fn delete_document(&self, user: &UserId, id: &str) -> ServiceResult<TeardownReport> {
        let doc = self.owned_document(user, id).await?;
        Ok(self.teardown.delete(&doc).await?)
    }

    /// (Re)index a document the caller owns and record its new status.
    pub async fn process_document(&self, user: &UserId, id: &str) -> ServiceResult<DocumentStatus> {
        let doc = self.owned_document(user, id).await?;
        let status = self.ingest.process(&doc).await;
        self.documents.set_status(&doc.id, status).await?;
        if self.documents.get(&doc.id).await?.is_none() {
            self.teardown
                .discard_orphaned_vectors(&doc.filename, doc.corpus)
                .await?;
        }
        Ok(status)
    }

    /// Answer from the public corpus. No identity required.
    pub async fn ask_public(&self, query: &str) -> ServiceResult<Answer> {
        self.answers
            .answer(Corpus::Public, None, query, Scope::All)
            .await
    }

    /// Answer from the caller's private documents, bundling recent history.
    pub async fn ask_private(
        &self,
        user: Option<&UserId>,
        query: &str,
    ) -> ServiceResult<PrivateAnswer> {
        let user = user.ok_or(ServiceError::Unauthenticated)?;
        let answer = self
            .answers
            .answer(Corpus::Private, Some(user), query, Scope::OwnedBy(user))
            .await?;

        let limit = self.answers.settings().chat_history;
        let history = match self.answers.history(user, limit).await {
            Ok(history) => history,
            Err(e) => {
                error!(owner = %user, "failed to load chat history: {:#}", e);
                Vec::new()
            }
        };

        Ok(PrivateAnswer {
            answer: answer.answer,
            sources: answer.sources,
            history,
        })
    }

    /// The caller's most recent private exchanges, oldest first.
    pub async fn private_history(&self, user: Option<&UserId>) -> ServiceResult<Vec<Conversation>> {
        let user = user.ok_or(ServiceError::Unauthenticated)?;
        let limit = self.answers.settings().history_limit;
        Ok(self.answers.history(user, limit).await?)
    }

    /// Retry cleanups left behind by partially failed deletions.
    pub async fn reconcile(&self) -> ServiceResult<usize> {
        Ok(self.teardown.reconcile().await?)
    }

    pub async fn stats(&self) -> ServiceResult<Stats> {
        let by_status: Vec<DocumentCount> = self
            .documents
            .counts()
            .await?
            .into_iter()
            .map(|(corpus, status, count)| DocumentCount {
                corpus,
                status,
                count,
            })
            .collect();

        let mut corpora = Vec::new();
        for corpus in [Corpus::Public, Corpus::Private] {
            corpora.push(CorpusStats {
                corpus,
                documents: by_status
                    .iter()
                    .filter(|c| c.corpus == corpus)
                    .map(|c| c.count)
                    .sum(),
                vectors: self.indexes.get(corpus).count().await?,
                conversations: self.conversations.count(corpus).await?,
            });
        }

        Ok(Stats {
            corpora,
            by_status,
            pending_cleanups: self.teardown.cleanups().count().await?,
        })
    }

    async fn owned_document(&self, user: &UserId, id: &str) -> ServiceResult<Document> {
        let doc = self
            .documents
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        if &doc.owner != user {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(doc)
    }
}
