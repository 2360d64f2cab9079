//! End-to-end tests driving `DocQa` with deterministic providers.
//!
//! The embedder hashes words into buckets so texts sharing words score
//! close together; the generator answers with the best-matching context
//! passage. Both indexes are real SQLite indexes in a temp directory.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use docqa::answer::PRIVATE_APOLOGY;
use docqa::config::{ChunkingConfig, RetrievalConfig};
use docqa::db;
use docqa::documents::DocumentRepo;
use docqa::migrate::migrate_pool;
use docqa::models::{Corpus, DocumentStatus, UserId};
use docqa::sqlite_index::SqliteIndex;
use docqa::storage::FsByteStore;
use docqa::{DocQa, Parts, ServiceError};
use docqa_core::embedding::Embedder;
use docqa_core::generation::Generator;
use docqa_core::store::CorpusIndexes;
use tempfile::TempDir;

const DIMS: usize = 64;

struct BagOfWordsEmbedder;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        let bucket = word
            .bytes()
            .fold(7u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32)) as usize
            % DIMS;
        v[bucket] += 1.0;
    }
    v
}

/// Answers with the first context passage of the stuffed prompt.
struct ExtractiveGenerator;

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String> {
        let passage = prompt
            .split("\n\n")
            .nth(1)
            .filter(|p| !p.starts_with("Question:"));
        Ok(match passage {
            Some(p) => format!("According to the documents: {}", p),
            None => "I don't know.".to_string(),
        })
    }
}

struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    fn model_name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        anyhow::bail!("connection refused")
    }
}

async fn app_with(tmp: &TempDir, generator: Arc<dyn Generator>) -> DocQa {
    let root = tmp.path();
    let pool = db::connect_path(&root.join("docqa.sqlite")).await.unwrap();
    migrate_pool(&pool).await.unwrap();
    let public = SqliteIndex::open(&root.join("index/public"), "documents")
        .await
        .unwrap();
    let private = SqliteIndex::open(&root.join("index/private"), "documents")
        .await
        .unwrap();

    DocQa::from_parts(Parts {
        pool,
        indexes: CorpusIndexes::new(Arc::new(public), Arc::new(private)),
        bytes: Arc::new(FsByteStore::new(root.join("uploads"))),
        embedder: Arc::new(BagOfWordsEmbedder),
        generator,
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
    })
    .unwrap()
}

async fn app(tmp: &TempDir) -> DocQa {
    app_with(tmp, Arc::new(ExtractiveGenerator)).await
}

async fn upload_and_process(
    app: &DocQa,
    user: &UserId,
    filename: &str,
    text: &str,
    corpus: Corpus,
) -> String {
    let doc = app
        .create_document(user, filename, text.as_bytes(), corpus)
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::NotProcessed);
    let status = app.process_document(user, &doc.id).await.unwrap();
    assert_eq!(status, DocumentStatus::Processed);
    doc.id
}

#[tokio::test]
async fn public_question_cites_uploaded_notes() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    upload_and_process(
        &app,
        &alice,
        "notes.txt",
        "The sky is blue. Water is wet.",
        Corpus::Public,
    )
    .await;

    let answer = app.ask_public("What color is the sky?").await.unwrap();
    assert!(answer.answer.contains("blue"), "answer: {}", answer.answer);
    assert!(answer.sources.iter().any(|c| c.source == "notes.txt"));
}

#[tokio::test]
async fn fewer_documents_than_k_returns_all_of_them() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    upload_and_process(&app, &alice, "one.txt", "Grass is green.", Corpus::Public).await;
    upload_and_process(&app, &alice, "two.txt", "The sky is blue.", Corpus::Public).await;

    let answer = app.ask_public("What color is the sky?").await.unwrap();
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].source, "two.txt");
}

#[tokio::test]
async fn deleted_document_is_no_longer_cited() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    let id = upload_and_process(
        &app,
        &alice,
        "notes.txt",
        "The sky is blue. Water is wet.",
        Corpus::Public,
    )
    .await;

    let report = app.delete_document(&alice, &id).await.unwrap();
    assert!(report.is_complete());
    assert!(report.pending_cleanup.is_none());
    assert!(!tmp.path().join("uploads/notes.txt").exists());
    assert!(app.list_documents(&alice).await.unwrap().is_empty());

    let answer = app.ask_public("What color is the sky?").await.unwrap();
    assert!(answer.sources.iter().all(|c| c.source != "notes.txt"));

    let stats = app.stats().await.unwrap();
    assert_eq!(stats.corpus(Corpus::Public).unwrap().vectors, 0);
    assert_eq!(stats.pending_cleanups, 0);
}

#[tokio::test]
async fn reprocessing_does_not_duplicate_vectors() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    let text = "A paragraph about the weather.\n\n".repeat(80);
    let id = upload_and_process(&app, &alice, "weather.txt", &text, Corpus::Public).await;
    let first = app.stats().await.unwrap();

    app.process_document(&alice, &id).await.unwrap();
    let second = app.stats().await.unwrap();

    let vectors = |s: &docqa::stats::Stats| s.corpus(Corpus::Public).unwrap().vectors;
    assert!(vectors(&first) > 1);
    assert_eq!(vectors(&first), vectors(&second));
}

#[tokio::test]
async fn private_chat_bundles_last_four_and_history_returns_all_recent() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    upload_and_process(
        &app,
        &alice,
        "diary.txt",
        "Today the sky is blue.",
        Corpus::Private,
    )
    .await;

    let mut last = None;
    for i in 1..=5 {
        last = Some(
            app.ask_private(Some(&alice), &format!("question {} about the sky", i))
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    let bundled: Vec<&str> = last.history.iter().map(|c| c.query.as_str()).collect();
    assert_eq!(
        bundled,
        vec![
            "question 2 about the sky",
            "question 3 about the sky",
            "question 4 about the sky",
            "question 5 about the sky",
        ]
    );
    assert_eq!(last.sources[0].source, "diary.txt");

    let history = app.private_history(Some(&alice)).await.unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].query, "question 1 about the sky");
    assert_eq!(history[4].query, "question 5 about the sky");
}

#[tokio::test]
async fn history_is_capped_at_ten() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    for i in 1..=12 {
        app.ask_private(Some(&alice), &format!("q{}", i))
            .await
            .unwrap();
    }
    let history = app.private_history(Some(&alice)).await.unwrap();
    let queries: Vec<&str> = history.iter().map(|c| c.query.as_str()).collect();
    assert_eq!(
        queries,
        vec!["q3", "q4", "q5", "q6", "q7", "q8", "q9", "q10", "q11", "q12"]
    );
}

#[tokio::test]
async fn private_answers_only_cite_the_callers_documents() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    upload_and_process(&app, &alice, "alice.txt", "The sky is blue.", Corpus::Private).await;
    upload_and_process(&app, &bob, "bob.txt", "The sky is red.", Corpus::Private).await;

    let answer = app
        .ask_private(Some(&alice), "What color is the sky?")
        .await
        .unwrap();
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.iter().all(|c| c.source == "alice.txt"));

    let public = app.ask_public("What color is the sky?").await.unwrap();
    assert!(public.sources.is_empty());
}

#[tokio::test]
async fn blank_queries_are_rejected_on_both_endpoints() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");

    assert!(matches!(
        app.ask_public("   ").await,
        Err(ServiceError::EmptyQuery)
    ));
    assert!(matches!(
        app.ask_private(Some(&alice), "").await,
        Err(ServiceError::EmptyQuery)
    ));
    assert!(app.private_history(Some(&alice)).await.unwrap().is_empty());
}

#[tokio::test]
async fn private_endpoints_require_a_user() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    assert!(matches!(
        app.ask_private(None, "hello").await,
        Err(ServiceError::Unauthenticated)
    ));
    assert!(matches!(
        app.private_history(None).await,
        Err(ServiceError::Unauthenticated)
    ));
}

#[tokio::test]
async fn only_the_owner_may_process_or_delete() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    let mallory = UserId::new("mallory");
    let doc = app
        .create_document(&alice, "notes.txt", b"The sky is blue.", Corpus::Public)
        .await
        .unwrap();

    assert!(matches!(
        app.process_document(&mallory, &doc.id).await,
        Err(ServiceError::PermissionDenied)
    ));
    assert!(matches!(
        app.delete_document(&mallory, &doc.id).await,
        Err(ServiceError::PermissionDenied)
    ));

    let docs = app.list_documents(&alice).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].status, DocumentStatus::NotProcessed);
    assert!(tmp.path().join("uploads/notes.txt").exists());
    assert!(app.list_documents(&mallory).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    assert!(matches!(
        app.process_document(&alice, "missing").await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        app.delete_document(&alice, "missing").await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn unsupported_format_is_a_terminal_status() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    let doc = app
        .create_document(&alice, "table.csv", b"a,b\n1,2\n", Corpus::Public)
        .await
        .unwrap();

    let status = app.process_document(&alice, &doc.id).await.unwrap();
    assert_eq!(status, DocumentStatus::UnsupportedFormat);
    let docs = app.list_documents(&alice).await.unwrap();
    assert_eq!(docs[0].status, DocumentStatus::UnsupportedFormat);
}

#[tokio::test]
async fn path_like_filenames_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    for name in ["../escape.txt", "a/b.txt", "", ".."] {
        assert!(matches!(
            app.create_document(&alice, name, b"x", Corpus::Public).await,
            Err(ServiceError::InvalidFilename(_))
        ));
    }
}

#[tokio::test]
async fn generation_outage_is_answered_with_apology_and_logged() {
    let tmp = TempDir::new().unwrap();
    let app = app_with(&tmp, Arc::new(OfflineGenerator)).await;
    let alice = UserId::new("alice");

    let answer = app.ask_private(Some(&alice), "anything?").await.unwrap();
    assert_eq!(answer.answer, PRIVATE_APOLOGY);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.history.len(), 1);
    assert_eq!(answer.history[0].answer, PRIVATE_APOLOGY);
}

#[tokio::test]
async fn list_is_newest_first() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp).await;
    let alice = UserId::new("alice");
    for name in ["a.txt", "b.txt", "c.txt"] {
        app.create_document(&alice, name, b"text", Corpus::Private)
            .await
            .unwrap();
    }
    let names: Vec<String> = app
        .list_documents(&alice)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.filename)
        .collect();
    assert_eq!(names, vec!["c.txt", "b.txt", "a.txt"]);
}

/// Drops the armed document's record while its chunks are being embedded,
/// as a concurrent delete that finished first would.
struct RecordDroppingEmbedder {
    documents: DocumentRepo,
    armed: Mutex<Option<String>>,
}

#[async_trait]
impl Embedder for RecordDroppingEmbedder {
    fn model_name(&self) -> &str {
        "record-dropping"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let armed = self.armed.lock().unwrap().take();
        if let Some(id) = armed {
            self.documents.delete(&id).await?;
        }
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

#[tokio::test]
async fn processing_a_document_deleted_midway_leaves_no_vectors() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let pool = db::connect_path(&root.join("docqa.sqlite")).await.unwrap();
    migrate_pool(&pool).await.unwrap();
    let public = SqliteIndex::open(&root.join("index/public"), "documents")
        .await
        .unwrap();
    let private = SqliteIndex::open(&root.join("index/private"), "documents")
        .await
        .unwrap();
    let embedder = Arc::new(RecordDroppingEmbedder {
        documents: DocumentRepo::new(pool.clone()),
        armed: Mutex::new(None),
    });
    let app = DocQa::from_parts(Parts {
        pool,
        indexes: CorpusIndexes::new(Arc::new(public), Arc::new(private)),
        bytes: Arc::new(FsByteStore::new(root.join("uploads"))),
        embedder: embedder.clone(),
        generator: Arc::new(ExtractiveGenerator),
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
    })
    .unwrap();

    let alice = UserId::new("alice");
    let doc = app
        .create_document(&alice, "notes.txt", b"The sky is blue.", Corpus::Public)
        .await
        .unwrap();
    *embedder.armed.lock().unwrap() = Some(doc.id.clone());

    let status = app.process_document(&alice, &doc.id).await.unwrap();
    assert_eq!(status, DocumentStatus::Processed);
    assert!(app.list_documents(&alice).await.unwrap().is_empty());

    let stats = app.stats().await.unwrap();
    assert_eq!(stats.corpus(Corpus::Public).unwrap().vectors, 0);
    let answer = app.ask_public("What color is the sky?").await.unwrap();
    assert!(answer.sources.is_empty());
}
