//! Relational schema migrations.
//!
//! All statements are idempotent; [`DocQa::open`](crate::service::DocQa::open)
//! runs them on every start.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Uploaded documents
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            owner TEXT NOT NULL,
            corpus TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'not-processed',
            uploaded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only chat log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT,
            corpus TEXT NOT NULL,
            query TEXT NOT NULL,
            answer TEXT NOT NULL,
            sources_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Teardown steps that failed during document deletion
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_cleanups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            corpus TEXT NOT NULL,
            embeddings_pending INTEGER NOT NULL,
            bytes_pending INTEGER NOT NULL,
            last_error TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner, uploaded_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner, corpus, id DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("docqa.sqlite")).await.unwrap();
        migrate_pool(&pool).await.unwrap();
        migrate_pool(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["conversations", "documents", "pending_cleanups"]);
    }
}
