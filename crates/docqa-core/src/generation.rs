//! Answer generation trait and prompt construction.
//!
//! Retrieval uses the "stuff" strategy: all retrieved chunks are joined
//! into a single context block and sent with the question in one
//! completion call. No prior conversation turns are included.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SearchHit;

/// Single-turn, stateless text completion.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    /// Complete `prompt` at the given sampling temperature.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Builds the stuffed retrieval prompt.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join retrieved chunk texts into a context block, best match first.
    pub fn build_context(hits: &[SearchHit]) -> String {
        hits.iter()
            .map(|h| h.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the full prompt for `question` over `hits`.
    pub fn build_stuffed_prompt(question: &str, hits: &[SearchHit]) -> String {
        format!(
            r#"Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}

Question: {question}
Helpful Answer:"#,
            context = Self::build_context(hits),
            question = question.trim()
        )
    }
}
