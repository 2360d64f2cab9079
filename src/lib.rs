//! # DocQA
//!
//! A retrieval-augmented document question-answering backend.
//!
//! Users upload PDF, DOCX, or TXT files into a `public` or `private`
//! corpus. Processing a document extracts its text, splits it into
//! overlapping chunks, embeds them, and stores the vectors in that corpus's
//! index. Questions are answered by embedding the query, retrieving the
//! top-k chunks, and asking a language model to answer from that context.
//! Every exchange is logged; private exchanges are returned as history.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Upload  │──▶│  Ingestion   │──▶│ Vector index │
//! │  bytes   │   │ load+chunk+  │   │ public/priv. │
//! └──────────┘   │    embed     │   └──────┬───────┘
//!                └──────────────┘          │
//!                                          ▼
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │   CLI    │──▶│  Answering   │──▶│ Conversation │
//! │ (docqa)  │   │ embed+search │   │     log      │
//! └──────────┘   │  +generate   │   └──────────────┘
//!                └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init
//! docqa upload ./notes.txt --user alice --corpus public
//! docqa process <id> --user alice
//! docqa ask "What color is the sky?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Document and conversation records |
//! | [`service`] | The `DocQa` facade |
//! | [`loader`] | PDF/DOCX/TXT text extraction |
//! | [`ingest`] | Ingestion pipeline |
//! | [`answer`] | Retrieval-answering pipeline |
//! | [`lifecycle`] | Document teardown and reconciliation |
//! | [`sqlite_index`] | Directory-backed vector index |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Language model providers |
//! | [`documents`] | Document records |
//! | [`conversations`] | Conversation log |
//! | [`storage`] | Uploaded-bytes store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod config;
pub mod conversations;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod generation;
mod http;
pub mod ingest;
pub mod lifecycle;
pub mod loader;
pub mod locks;
pub mod migrate;
pub mod models;
pub mod service;
pub mod sqlite_index;
pub mod stats;
pub mod storage;

pub use error::{ServiceError, ServiceResult};
pub use service::{DocQa, Parts};
