//! In-Memory Snapshot Storage
//!
//! Information Hiding:
//! - Snapshot held behind an async RwLock
//! - Suitable for testing and ephemeral runs

use super::ConversationStorage;
use crate::core::turn::ConversationStore;
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Data is lost when the process terminates.
#[derive(Default)]
pub struct InMemoryStorage {
    snapshot: RwLock<Option<ConversationStore>>,
    saves: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(store: ConversationStore) -> Self {
        Self {
            snapshot: RwLock::new(Some(store)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Last saved snapshot, if any.
    pub async fn snapshot(&self) -> Option<ConversationStore> {
        self.snapshot.read().await.clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationStorage for InMemoryStorage {
    async fn load(&self) -> Result<Option<ConversationStore>, StorageError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, store: &ConversationStore) -> Result<(), StorageError> {
        *self.snapshot.write().await = Some(store.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("[InMemoryStorage] Saved {} histories", store.len());
        Ok(())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from(":memory:")
    }
}
