//! Store statistics and health overview.
//!
//! A quick summary of what the service holds: documents per corpus and
//! status, vectors per index, logged exchanges, and cleanups still waiting
//! on `reconcile`. Used by `docqa stats`.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::models::{Corpus, DocumentStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentCount {
    pub corpus: Corpus,
    pub status: DocumentStatus,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub corpus: Corpus,
    pub documents: i64,
    pub vectors: usize,
    pub conversations: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub corpora: Vec<CorpusStats>,
    pub by_status: Vec<DocumentCount>,
    pub pending_cleanups: i64,
}

impl Stats {
    pub fn corpus(&self, corpus: Corpus) -> Option<&CorpusStats> {
        self.corpora.iter().find(|c| c.corpus == corpus)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {:<10} {:>10} {:>10} {:>14}",
            "CORPUS", "DOCUMENTS", "VECTORS", "CONVERSATIONS"
        )?;
        writeln!(f, "  {}", "-".repeat(47))?;
        for c in &self.corpora {
            writeln!(
                f,
                "  {:<10} {:>10} {:>10} {:>14}",
                c.corpus.as_str(),
                c.documents,
                c.vectors,
                c.conversations
            )?;
        }

        if !self.by_status.is_empty() {
            writeln!(f)?;
            writeln!(f, "  By status:")?;
            for s in &self.by_status {
                writeln!(
                    f,
                    "  {:<10} {:<20} {:>6}",
                    s.corpus.as_str(),
                    s.status.as_str(),
                    s.count
                )?;
            }
        }

        writeln!(f)?;
        write!(f, "  Pending cleanups: {}", self.pending_cleanups)
    }
}

/// Size of the file at `path`, or 0 when it does not exist.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
