//! Retrieval-answering pipeline.
//!
//! Each request moves through
//! `received → embedded → retrieved → generated → logged → responded`,
//! and every stage is emitted at debug level as it is reached.
//! A blank query is rejected up front. Any failure before `generated`
//! is logged with the last stage reached and replaced by the corpus's
//! canned apology with no citations; the exchange is still written to the
//! conversation log.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use docqa_core::embedding::{check_dims, Embedder};
use docqa_core::generation::{Generator, PromptBuilder};
use docqa_core::models::SearchHit;
use docqa_core::store::CorpusIndexes;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::RetrievalConfig;
use crate::conversations::ConversationLog;
use crate::documents::DocumentRepo;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Citation, Conversation, Corpus, UserId};

pub const PUBLIC_APOLOGY: &str = "Sorry, something went wrong while answering your question.";
pub const PRIVATE_APOLOGY: &str = "Sorry, something went wrong while processing your question.";

/// Canned answer returned when retrieval or generation fails.
pub fn apology(corpus: Corpus) -> &'static str {
    match corpus {
        Corpus::Public => PUBLIC_APOLOGY,
        Corpus::Private => PRIVATE_APOLOGY,
    }
}

/// Answer text plus the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Citation>,
}

/// A private answer bundled with the caller's recent exchanges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateAnswer {
    pub answer: String,
    pub sources: Vec<Citation>,
    /// Most recent private exchanges, oldest first, including this one.
    pub history: Vec<Conversation>,
}

/// Request progress, as emitted in the `stage` log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Embedded,
    Retrieved,
    Generated,
    Logged,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Embedded => "embedded",
            Stage::Retrieved => "retrieved",
            Stage::Generated => "generated",
            Stage::Logged => "logged",
            Stage::Responded => "responded",
        };
        f.write_str(s)
    }
}

/// Which vectors a request may retrieve from.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// The whole corpus index.
    All,
    /// Only vectors from documents this user uploaded to the corpus.
    OwnedBy(&'a UserId),
}

pub struct AnswerPipeline {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    indexes: CorpusIndexes,
    documents: DocumentRepo,
    log: ConversationLog,
    settings: RetrievalConfig,
}

impl AnswerPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        indexes: CorpusIndexes,
        documents: DocumentRepo,
        log: ConversationLog,
        settings: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            indexes,
            documents,
            log,
            settings,
        }
    }

    /// Answer `query` against `corpus` and log the exchange under `owner`.
    ///
    /// Fails only with [`ServiceError::EmptyQuery`].
    pub async fn answer(
        &self,
        corpus: Corpus,
        owner: Option<&UserId>,
        query: &str,
        scope: Scope<'_>,
    ) -> ServiceResult<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::EmptyQuery);
        }
        debug!(corpus = %corpus, stage = %Stage::Received, "question received");

        let (answer, sources) = match self.retrieve_and_generate(corpus, query, scope).await {
            Ok((answer, hits)) => {
                let sources = hits
                    .iter()
                    .map(|h| Citation::from_hit(h, self.settings.excerpt_chars))
                    .collect();
                (answer, sources)
            }
            Err((stage, e)) => {
                error!(
                    corpus = %corpus,
                    after = %stage,
                    "answering failed: {:#}",
                    e
                );
                (apology(corpus).to_string(), Vec::new())
            }
        };

        match self.log.append(owner, corpus, query, &answer, &sources).await {
            Ok(conversation) => debug!(
                corpus = %corpus,
                conversation_id = conversation.id,
                stage = %Stage::Logged,
                "exchange logged"
            ),
            Err(e) => error!(corpus = %corpus, "failed to log conversation: {:#}", e),
        }

        info!(
            corpus = %corpus,
            sources = sources.len(),
            stage = %Stage::Responded,
            "question answered"
        );
        Ok(Answer { answer, sources })
    }

    /// The `limit` most recent exchanges by `owner` in the private corpus, oldest first.
    pub async fn history(&self, owner: &UserId, limit: usize) -> Result<Vec<Conversation>> {
        self.log.recent(owner, Corpus::Private, limit).await
    }

    pub fn settings(&self) -> &RetrievalConfig {
        &self.settings
    }

    async fn retrieve_and_generate(
        &self,
        corpus: Corpus,
        query: &str,
        scope: Scope<'_>,
    ) -> std::result::Result<(String, Vec<SearchHit>), (Stage, anyhow::Error)> {
        let query_vec = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| (Stage::Received, e))?;
        check_dims(self.embedder.dims(), std::slice::from_ref(&query_vec))
            .map_err(|e| (Stage::Received, e))?;
        debug!(corpus = %corpus, stage = %Stage::Embedded, "query embedded");

        let index = self.indexes.get(corpus);
        let k = self.settings.top_k;
        let hits = match scope {
            Scope::All => index.search(&query_vec, k).await,
            Scope::OwnedBy(owner) => match self.documents.filenames_for(owner, corpus).await {
                Ok(sources) => index.search_sources(&query_vec, k, &sources).await,
                Err(e) => Err(e),
            },
        }
        .map_err(|e| (Stage::Embedded, e))?;
        debug!(corpus = %corpus, hits = hits.len(), stage = %Stage::Retrieved, "retrieved context");

        let prompt = PromptBuilder::build_stuffed_prompt(query, &hits);
        let answer = self
            .generator
            .complete(&prompt, self.settings.temperature)
            .await
            .map_err(|e| (Stage::Retrieved, e))?;
        debug!(corpus = %corpus, stage = %Stage::Generated, "answer generated");

        Ok((answer, hits))
    }
}
