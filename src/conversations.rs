//! Append-only conversation log.
//!
//! Rows are never updated. History reads take the most recent `limit`
//! exchanges (highest id first) and hand them back oldest-first.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{Citation, Conversation, Corpus, UserId};

#[derive(Clone)]
pub struct ConversationLog {
    pool: SqlitePool,
}

impl ConversationLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record one exchange and return it with its assigned id.
    pub async fn append(
        &self,
        owner: Option<&UserId>,
        corpus: Corpus,
        query: &str,
        answer: &str,
        sources: &[Citation],
    ) -> Result<Conversation> {
        let created_at = chrono::Utc::now().timestamp();
        let sources_json = serde_json::to_string(sources)?;

        let result = sqlx::query(
            "INSERT INTO conversations (owner, corpus, query, answer, sources_json, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(owner.map(UserId::as_str))
        .bind(corpus.as_str())
        .bind(query)
        .bind(answer)
        .bind(&sources_json)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Conversation {
            id: result.last_insert_rowid(),
            owner: owner.cloned(),
            corpus,
            query: query.to_string(),
            answer: answer.to_string(),
            sources: sources.to_vec(),
            created_at,
        })
    }

    /// The `limit` most recent exchanges by `owner` in `corpus`, oldest first.
    pub async fn recent(
        &self,
        owner: &UserId,
        corpus: Corpus,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, corpus, query, answer, sources_json, created_at
            FROM conversations
            WHERE owner = ? AND corpus = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(owner.as_str())
        .bind(corpus.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut history = rows
            .iter()
            .map(conversation_from_row)
            .collect::<Result<Vec<_>>>()?;
        history.reverse();
        Ok(history)
    }

    pub async fn count(&self, corpus: Corpus) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE corpus = ?")
                .bind(corpus.as_str())
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    let owner: Option<String> = row.get("owner");
    let corpus: String = row.get("corpus");
    let sources_json: String = row.get("sources_json");
    Ok(Conversation {
        id: row.get("id"),
        owner: owner.map(UserId::new),
        corpus: corpus
            .parse()
            .with_context(|| "Corrupt conversations.corpus value")?,
        query: row.get("query"),
        answer: row.get("answer"),
        sources: serde_json::from_str(&sources_json)
            .with_context(|| "Corrupt conversations.sources_json value")?,
        created_at: row.get("created_at"),
    })
}
