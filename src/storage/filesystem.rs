//! File System Snapshot Storage
//!
//! Information Hiding:
//! - Snapshot is one pretty-printed JSON object `{user_id: [turn, ..]}`
//! - Writes go to a sibling temp file that is renamed over the snapshot

use super::ConversationStorage;
use crate::core::turn::ConversationStore;
use crate::error::StorageError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::fs;

pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("conversations.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConversationStorage for JsonFileStorage {
    async fn load(&self) -> Result<Option<ConversationStore>, StorageError> {
        if !fs::try_exists(&self.path).await? {
            tracing::debug!("[JsonFileStorage] No snapshot at {:?}", self.path);
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path).await?;
        let store: ConversationStore = serde_json::from_str(&json)?;

        tracing::debug!(
            "[JsonFileStorage] Loaded {} histories from {:?}",
            store.len(),
            self.path
        );
        Ok(Some(store))
    }

    async fn save(&self, store: &ConversationStore) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(store)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.temp_path();
        fs::write(&temp_path, json).await?;
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(
            "[JsonFileStorage] Saved {} histories to {:?}",
            store.len(),
            self.path
        );
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}
