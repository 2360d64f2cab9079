//! Per-source mutual exclusion.
//!
//! Vector writes for one filename in one corpus (the delete-then-insert of
//! processing, and the delete of teardown) run under that source's lock so
//! the index never mixes chunks from two loads of the same file.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::Corpus;

type Key = (Corpus, String);

/// Lazily-created async mutex per `(corpus, filename)`.
#[derive(Default)]
pub struct SourceLocks {
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the lock for `filename` in `corpus`.
    pub async fn acquire(&self, corpus: Corpus, filename: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry((corpus, filename.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_source_is_serialised() {
        let locks = Arc::new(SourceLocks::new());
        let guard = locks.acquire(Corpus::Public, "a.txt").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(Corpus::Public, "a.txt").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_sources_do_not_block() {
        let locks = SourceLocks::new();
        let _a = locks.acquire(Corpus::Public, "a.txt").await;
        let _b = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(Corpus::Private, "a.txt"),
        )
        .await
        .unwrap();
        let _c = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(Corpus::Public, "b.txt"),
        )
        .await
        .unwrap();
    }
}
