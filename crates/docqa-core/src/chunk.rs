//! Recursive, overlap-aware text chunker.
//!
//! Splits extracted document text into windows of at most `chunk_size`
//! characters where consecutive windows share exactly `chunk_overlap`
//! characters. Window ends prefer natural boundaries, tried in order:
//!
//! 1. paragraph breaks (`\n\n`)
//! 2. sentence ends and line breaks (`". "`, `"! "`, `"? "`, `\n`)
//! 3. word breaks (space, tab)
//! 4. a hard cut at `chunk_size` characters
//!
//! The separator stays with the chunk it terminates. Because every chunk
//! is a slice of the input and the next chunk starts `chunk_overlap`
//! characters before the previous one ends, dropping the first
//! `chunk_overlap` characters of every chunk after the first and
//! concatenating reconstructs the input exactly.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(1000, 100).unwrap();
//! let chunks: Vec<&str> = splitter.split("The sky is blue.").collect();
//! assert_eq!(chunks, vec!["The sky is blue."]);
//! ```

use anyhow::{ensure, Result};
use sha2::{Digest, Sha256};

use crate::models::{Chunk, TextUnit};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Boundary levels, coarsest first.
const SEPARATORS: &[&[&str]] = &[&["\n\n"], &[". ", "! ", "? ", "\n"], &[" ", "\t"]];

/// Splits text into overlapping, boundary-aligned chunks.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl RecursiveSplitter {
    /// Create a splitter. `chunk_overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size must be > 0");
        ensure!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap,
            chunk_size
        );
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily split `text`. Blank input yields no chunks.
    ///
    /// The returned iterator borrows `text`; calling `split` again (or
    /// cloning the iterator) restarts from the beginning and yields the
    /// same sequence.
    pub fn split<'a>(&self, text: &'a str) -> Splits<'a> {
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        Splits {
            text,
            offsets,
            start: 0,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            done: text.trim().is_empty(),
        }
    }

    /// Split every unit and flatten into [`Chunk`]s with contiguous indices.
    ///
    /// Each chunk inherits its unit's `source` and `page`. Whitespace-only
    /// pieces are dropped; [`split`](Self::split) still yields them.
    pub fn split_units(&self, units: &[TextUnit]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for unit in units {
            let source = unit.source.clone().unwrap_or_default();
            for piece in self.split(&unit.text).filter(|p| !p.trim().is_empty()) {
                chunks.push(make_chunk(&source, unit.page, chunks.len(), piece));
            }
        }
        chunks
    }
}

/// Iterator over the chunks of one text. Created by [`RecursiveSplitter::split`].
#[derive(Debug, Clone)]
pub struct Splits<'a> {
    text: &'a str,
    /// Byte offset of every char, followed by `text.len()`.
    offsets: Vec<usize>,
    /// Char index where the next chunk starts.
    start: usize,
    chunk_size: usize,
    chunk_overlap: usize,
    done: bool,
}

impl<'a> Iterator for Splits<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        let total_chars = self.offsets.len() - 1;
        let start_byte = self.offsets[self.start];

        if total_chars - self.start <= self.chunk_size {
            self.done = true;
            return Some(&self.text[start_byte..]);
        }

        // The end must leave the next start strictly after this one.
        let min_end = self.start + self.chunk_overlap + 1;
        let max_end = self.start + self.chunk_size;
        let window = &self.text[start_byte..self.offsets[max_end]];
        let min_bytes = self.offsets[min_end] - start_byte;

        let end = match find_break(window, min_bytes, SEPARATORS) {
            Some(byte_pos) => self.start + window[..byte_pos].chars().count(),
            None => max_end,
        };

        let piece = &self.text[start_byte..self.offsets[end]];
        self.start = end - self.chunk_overlap;
        Some(piece)
    }
}

/// Find the latest boundary in `window` ending at or after `min_bytes`,
/// descending to finer separator levels when a level has no usable match.
///
/// Returns the byte position just past the separator.
fn find_break(window: &str, min_bytes: usize, levels: &[&[&str]]) -> Option<usize> {
    let (level, finer) = levels.split_first()?;
    let best = level
        .iter()
        .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
        .max();
    match best {
        Some(pos) if pos >= min_bytes => Some(pos),
        _ => find_break(window, min_bytes, finer),
    }
}

fn make_chunk(source: &str, page: Option<u32>, index: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        source: source.to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
