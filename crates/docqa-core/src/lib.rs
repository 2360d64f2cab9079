//! # DocQA Core
//!
//! Shared, I/O-free logic for DocQA: data models, the recursive chunker,
//! the vector index abstraction and ranking, and the service traits for
//! embedding and answer generation.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Concrete backends live in the `docqa` app crate.

pub mod chunk;
pub mod embedding;
pub mod generation;
pub mod models;
pub mod search;
pub mod store;
