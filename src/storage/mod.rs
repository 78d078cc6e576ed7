//! Conversation Snapshot Storage
//!
//! Information Hiding:
//! - Snapshot backend hidden behind `ConversationStorage`
//! - `PersistentStore` owns the recovery policy: load falls back to an empty
//!   store, flush failures are logged and the in-memory store stays the
//!   source of truth

use crate::core::turn::ConversationStore;
use crate::error::{RelayError, StorageError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub mod filesystem;
pub mod memory;

pub use filesystem::JsonFileStorage;
pub use memory::InMemoryStorage;

/// A backend holding one full snapshot of every user's history.
#[async_trait]
pub trait ConversationStorage: Send + Sync {
    /// Read the snapshot. `Ok(None)` when no snapshot has been written yet.
    async fn load(&self) -> Result<Option<ConversationStore>, StorageError>;

    /// Overwrite the snapshot with `store`.
    async fn save(&self, store: &ConversationStore) -> Result<(), StorageError>;

    /// Where the snapshot lives, for log and error messages.
    fn location(&self) -> PathBuf;
}

#[derive(Clone)]
pub struct PersistentStore {
    storage: Arc<dyn ConversationStorage>,
}

impl PersistentStore {
    pub fn new(storage: Arc<dyn ConversationStorage>) -> Self {
        Self { storage }
    }

    /// Load the snapshot, or an empty store if it is absent or unreadable.
    pub async fn load(&self) -> ConversationStore {
        match self.try_load().await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("{}; starting with empty history", e);
                ConversationStore::new()
            }
        }
    }

    pub async fn try_load(&self) -> Result<ConversationStore, RelayError> {
        match self.storage.load().await {
            Ok(Some(store)) => {
                tracing::info!(
                    "Loaded history for {} users from {:?}",
                    store.len(),
                    self.storage.location()
                );
                Ok(store)
            }
            Ok(None) => {
                tracing::info!(
                    "No history snapshot at {:?}, starting empty",
                    self.storage.location()
                );
                Ok(ConversationStore::new())
            }
            Err(source) => Err(RelayError::HistoryLoad {
                path: self.storage.location(),
                source,
            }),
        }
    }

    /// Overwrite the snapshot. Failures are logged only; returns whether
    /// the snapshot was written.
    pub async fn flush(&self, store: &ConversationStore) -> bool {
        match self.try_flush(store).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("{}; keeping in-memory history until next flush", e);
                false
            }
        }
    }

    pub async fn try_flush(&self, store: &ConversationStore) -> Result<(), RelayError> {
        self.storage
            .save(store)
            .await
            .map_err(|source| RelayError::HistoryFlush {
                path: self.storage.location(),
                source,
            })?;

        tracing::debug!(
            "Flushed history for {} users to {:?}",
            store.len(),
            self.storage.location()
        );
        Ok(())
    }
}
