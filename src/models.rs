//! Records kept in the relational store.
//!
//! Chunks and vectors are not stored here; they live in the per-corpus
//! vector index and link back to a [`Document`] only through its filename.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use docqa_core::models::{Citation, Corpus, DocumentStatus};

/// Opaque authenticated-user reference supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    /// Byte-store key and vector-index source key.
    pub filename: String,
    pub owner: UserId,
    pub corpus: Corpus,
    pub status: DocumentStatus,
    /// Unix seconds.
    pub uploaded_at: i64,
}

/// One logged query/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: i64,
    /// `None` for anonymous public chat.
    pub owner: Option<UserId>,
    pub corpus: Corpus,
    pub query: String,
    pub answer: String,
    pub sources: Vec<Citation>,
    /// Unix seconds.
    pub created_at: i64,
}

/// Render Unix seconds as a UTC timestamp.
pub fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ts_is_utc() {
        assert_eq!(format_ts(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::new("alice")).unwrap();
        assert_eq!(json, "\"alice\"");
    }
}
