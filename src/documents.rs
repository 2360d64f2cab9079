//! Document records in the relational store.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Corpus, Document, DocumentStatus, UserId};

/// Read/write access to the `documents` table.
#[derive(Clone)]
pub struct DocumentRepo {
    pool: SqlitePool,
}

impl DocumentRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a `not-processed` record and return it.
    pub async fn insert(&self, owner: &UserId, filename: &str, corpus: Corpus) -> Result<Document> {
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            owner: owner.clone(),
            corpus,
            status: DocumentStatus::NotProcessed,
            uploaded_at: chrono::Utc::now().timestamp(),
        };

        sqlx::query(
            "INSERT INTO documents (id, filename, owner, corpus, status, uploaded_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(doc.owner.as_str())
        .bind(doc.corpus.as_str())
        .bind(doc.status.as_str())
        .bind(doc.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(doc)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, filename, owner, corpus, status, uploaded_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    /// Documents owned by `owner`, newest upload first.
    pub async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, owner, corpus, status, uploaded_at
            FROM documents
            WHERE owner = ?
            ORDER BY uploaded_at DESC, rowid DESC
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Distinct filenames `owner` has in `corpus`.
    pub async fn filenames_for(&self, owner: &UserId, corpus: Corpus) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT filename FROM documents WHERE owner = ? AND corpus = ? ORDER BY filename",
        )
        .bind(owner.as_str())
        .bind(corpus.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Whether any record uses `filename`, optionally only within `corpus`.
    pub async fn has_filename(&self, filename: &str, corpus: Option<Corpus>) -> Result<bool> {
        let n: i64 = match corpus {
            Some(corpus) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM documents WHERE filename = ? AND corpus = ?",
                )
                .bind(filename)
                .bind(corpus.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE filename = ?")
                    .bind(filename)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(n > 0)
    }

    pub async fn set_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove the record. Returns `false` if it was already gone.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Document counts grouped by corpus and status.
    pub async fn counts(&self) -> Result<Vec<(Corpus, DocumentStatus, i64)>> {
        let rows = sqlx::query(
            "SELECT corpus, status, COUNT(*) AS n FROM documents GROUP BY corpus, status ORDER BY corpus, status",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<(Corpus, DocumentStatus, i64)> {
                let corpus: String = row.get("corpus");
                let status: String = row.get("status");
                Ok((corpus.parse()?, status.parse()?, row.get("n")))
            })
            .collect()
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let corpus: String = row.get("corpus");
    let status: String = row.get("status");
    let owner: String = row.get("owner");
    Ok(Document {
        id: row.get("id"),
        filename: row.get("filename"),
        owner: UserId::new(owner),
        corpus: corpus
            .parse()
            .with_context(|| "Corrupt documents.corpus value")?,
        status: status
            .parse()
            .with_context(|| "Corrupt documents.status value")?,
        uploaded_at: row.get("uploaded_at"),
    })
}
