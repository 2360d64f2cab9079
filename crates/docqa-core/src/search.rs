//! Nearest-neighbor ranking shared by all [`VectorIndex`](crate::store::VectorIndex)
//! backends.
//!
//! Backends score every candidate vector by cosine similarity against the
//! query, then delegate ordering and truncation here so that all backends
//! agree on tie-breaking.
//!
//! # Ordering
//!
//! 1. Score, descending.
//! 2. Vector id, ascending (stable tie-break).
//! 3. Truncate to `k`. Fewer than `k` candidates returns all of them.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::SearchHit;

/// A stored vector plus its payload, as seen by the ranking step.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub id: &'a str,
    pub text: &'a str,
    pub source: &'a str,
    pub page: Option<u32>,
    pub vector: &'a [f32],
}

/// Score `candidates` against `query` and return the best `k`, best first.
pub fn top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<SearchHit>
where
    I: IntoIterator<Item = Candidate<'a>>,
{
    let hits = candidates
        .into_iter()
        .map(|c| SearchHit {
            id: c.id.to_string(),
            text: c.text.to_string(),
            source: c.source.to_string(),
            page: c.page,
            score: cosine_similarity(query, c.vector),
        })
        .collect();
    rank(hits, k)
}

/// Order already-scored hits best-first and keep at most `k`.
pub fn rank(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand<'a>(id: &'a str, vector: &'a [f32]) -> Candidate<'a> {
        Candidate {
            id,
            text: id,
            source: "s.txt",
            page: None,
            vector,
        }
    }

    #[test]
    fn returns_best_first() {
        let a = [1.0, 0.0];
        let b = [0.7, 0.7];
        let c = [0.0, 1.0];
        let hits = top_k(&[1.0, 0.0], vec![cand("c", &c), cand("a", &a), cand("b", &b)], 3);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn fewer_candidates_than_k_returns_all() {
        let a = [1.0, 0.0];
        let hits = top_k(&[1.0, 0.0], vec![cand("a", &a)], 3);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn ties_break_on_id() {
        let v = [1.0, 1.0];
        let hits = top_k(&[1.0, 1.0], vec![cand("z", &v), cand("m", &v)], 1);
        assert_eq!(hits[0].id, "m");
    }

    #[test]
    fn zero_k_is_empty() {
        let v = [1.0];
        assert!(top_k(&[1.0], vec![cand("a", &v)], 0).is_empty());
    }
}
