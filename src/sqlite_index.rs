//! Directory-backed [`VectorIndex`] on SQLite.
//!
//! Each corpus directory holds one `index.sqlite` file. Rows are scoped by
//! a collection name so several logical collections can share a file.
//! Vectors are stored as little-endian f32 BLOBs and searched brute-force;
//! every write runs in a transaction that commits before returning.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::models::{Chunk, SearchHit};
use docqa_core::search::{top_k, Candidate};
use docqa_core::store::{check_batch, VectorIndex};

use crate::db;

/// File name of the index database inside a corpus directory.
pub const INDEX_FILE: &str = "index.sqlite";

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

struct StoredRow {
    id: String,
    source: String,
    page: Option<u32>,
    text: String,
    vector: Vec<f32>,
}

impl StoredRow {
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

impl SqliteIndex {
    /// Open (creating if needed) the index in `dir` for `collection`.
    pub async fn open(dir: &Path, collection: &str) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        let pool = db::connect_path(&path).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                page INTEGER,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vectors_source ON vectors(collection, source)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    async fn fetch_rows(&self, sources: Option<&[String]>) -> Result<Vec<StoredRow>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, source, page, text, embedding FROM vectors WHERE collection = ",
        );
        qb.push_bind(&self.collection);
        if let Some(sources) = sources {
            qb.push(" AND source IN (");
            let mut separated = qb.separated(", ");
            for source in sources {
                separated.push_bind(source);
            }
            separated.push_unseparated(")");
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let page: Option<i64> = row.get("page");
                StoredRow {
                    id: row.get("id"),
                    source: row.get("source"),
                    page: page.and_then(|p| u32::try_from(p).ok()),
                    text: row.get("text"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(
        &self,
        source: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        check_batch(chunks, embeddings)?;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM vectors WHERE collection = ? AND source = ?")
            .bind(&self.collection)
            .bind(source)
            .execute(&mut *tx)
            .await?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO vectors (id, collection, source, chunk_index, page, text, hash, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&self.collection)
            .bind(source)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.page.map(i64::from))
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(embedding))
            .bind(now)
            .execute(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn delete_by_source(&self, source: &str) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM vectors WHERE collection = ? AND source = ?")
                .bind(&self.collection)
                .bind(source)
                .fetch_all(&mut *tx)
                .await?;
        sqlx::query("DELETE FROM vectors WHERE collection = ? AND source = ?")
            .bind(&self.collection)
            .bind(source)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ids)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let rows = self.fetch_rows(None).await?;
        Ok(top_k(query, rows.iter().map(StoredRow::candidate), k))
    }

    async fn search_sources(
        &self,
        query: &[f32],
        k: usize,
        sources: &[String],
    ) -> Result<Vec<SearchHit>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.fetch_rows(Some(sources)).await?;
        Ok(top_k(query, rows.iter().map(StoredRow::candidate), k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
