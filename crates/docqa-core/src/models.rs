//! Core data models shared by the ingestion and retrieval pipelines.
//!
//! These types carry no storage identity of their own: documents and
//! conversations get their ids from the relational store, chunks get
//! theirs from the vector index at upsert time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the two disjoint document collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    Public,
    Private,
}

impl Corpus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Public => "public",
            Corpus::Private => "private",
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a corpus or status string is not recognised.
#[derive(Debug, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseModelError {
    kind: &'static str,
    value: String,
}

impl FromStr for Corpus {
    type Err = ParseModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Corpus::Public),
            "private" => Ok(Corpus::Private),
            _ => Err(ParseModelError {
                kind: "corpus",
                value: s.to_string(),
            }),
        }
    }
}

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    NotProcessed,
    Processed,
    UnsupportedFormat,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::NotProcessed => "not-processed",
            DocumentStatus::Processed => "processed",
            DocumentStatus::UnsupportedFormat => "unsupported-format",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = ParseModelError;

    /// Accepts both the kebab-case form and the spaced, capitalised form
    /// (`"Not Processed"`, `"Unsupported Format"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(' ', "-");
        match normalized.as_str() {
            "not-processed" => Ok(DocumentStatus::NotProcessed),
            "processed" => Ok(DocumentStatus::Processed),
            "unsupported-format" => Ok(DocumentStatus::UnsupportedFormat),
            "error" => Ok(DocumentStatus::Error),
            _ => Err(ParseModelError {
                kind: "document status",
                value: s.to_string(),
            }),
        }
    }
}

/// A unit of extracted text (one PDF page, one DOCX body, one text file).
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub text: String,
    /// Filename the unit came from; set by the ingestion pipeline.
    pub source: Option<String>,
    /// 1-based page number for paginated formats.
    pub page: Option<u32>,
}

impl TextUnit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            page: None,
        }
    }

    pub fn with_page(text: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            source: None,
            page: Some(page),
        }
    }
}

/// A passage derived from a [`TextUnit`], the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Source filename, the only link back to the owning document.
    pub source: String,
    pub page: Option<u32>,
    /// Position of the chunk within its source, contiguous from 0.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A ranked match returned by a vector index search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Index-internal vector id.
    pub id: String,
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    /// Cosine similarity in `[-1.0, 1.0]`, higher is better.
    pub score: f32,
}

/// A retrieved chunk's filename plus a truncated excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub content: String,
    /// 1-based page for paginated formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Citation {
    /// Build a citation whose excerpt is at most `max_chars` characters.
    pub fn from_hit(hit: &SearchHit, max_chars: usize) -> Self {
        Self {
            source: hit.source.clone(),
            content: hit.text.chars().take(max_chars).collect(),
            page: hit.page,
        }
    }
}
