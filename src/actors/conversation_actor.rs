use crate::actors::messages::ConversationMessage;
use crate::conversation::{HistoryManager, Rollback, TruncationPolicy};
use crate::core::turn::{ConversationHistory, ConversationStore};
use crate::storage::PersistentStore;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Handle to the task that owns every user's history. Messages are handled
/// one at a time, so appends for a user never interleave.
#[derive(Clone)]
pub struct ConversationHandle {
    sender: Sender<ConversationMessage>,
}

impl ConversationHandle {
    /// Load the snapshot (or start empty) and spawn the actor.
    pub async fn spawn(
        persistent: PersistentStore,
        policy: TruncationPolicy,
        flush_interval: Duration,
        buffer_size: usize,
    ) -> Self {
        let store = persistent.load().await;
        let manager = HistoryManager::new(store, policy);
        let (sender, receiver) = channel(buffer_size.max(1));
        tokio::spawn(conversation_actor(receiver, manager, persistent, flush_interval));
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ConversationMessage,
    ) -> anyhow::Result<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(build(response_tx))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send message to conversation actor: {}", e))?;
        response_rx
            .await
            .map_err(|e| anyhow::anyhow!("Conversation actor dropped the request: {}", e))
    }

    pub async fn append_user_turn(&self, user_id: &str, text: &str) -> anyhow::Result<()> {
        self.request(|response| ConversationMessage::AppendUser {
            user_id: user_id.to_string(),
            text: text.to_string(),
            response,
        })
        .await
    }

    /// Appends and waits for the snapshot flush that follows.
    pub async fn append_assistant_turn(&self, user_id: &str, text: &str) -> anyhow::Result<()> {
        self.request(|response| ConversationMessage::AppendAssistant {
            user_id: user_id.to_string(),
            text: text.to_string(),
            response,
        })
        .await
    }

    /// Undo the unanswered user turn. If that turn was already flushed the
    /// snapshot is rewritten before this returns. Returns false if there was
    /// nothing to undo.
    pub async fn discard_pending_turn(&self, user_id: &str) -> anyhow::Result<bool> {
        self.request(|response| ConversationMessage::DiscardPending {
            user_id: user_id.to_string(),
            response,
        })
        .await
    }

    pub async fn get_context(&self, user_id: &str) -> anyhow::Result<ConversationHistory> {
        self.request(|response| ConversationMessage::GetContext {
            user_id: user_id.to_string(),
            response,
        })
        .await
    }

    pub async fn snapshot(&self) -> anyhow::Result<ConversationStore> {
        self.request(ConversationMessage::Snapshot).await
    }

    pub async fn users(&self) -> anyhow::Result<Vec<String>> {
        self.request(ConversationMessage::Users).await
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.request(ConversationMessage::Flush).await
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.request(ConversationMessage::Shutdown).await
    }
}

async fn conversation_actor(
    mut receiver: Receiver<ConversationMessage>,
    mut manager: HistoryManager,
    persistent: PersistentStore,
    flush_interval: Duration,
) {
    let mut flush_timer = interval_at(Instant::now() + flush_interval, flush_interval);
    flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "Conversation actor started (flush every {:?})",
        flush_interval
    );

    loop {
        tokio::select! {
            message = receiver.recv() => {
                match message {
                    Some(ConversationMessage::Shutdown(response)) => {
                        flush_store(&mut manager, &persistent).await;
                        tracing::info!("Conversation actor received shutdown signal");
                        let _ = response.send(());
                        break;
                    }
                    Some(message) => {
                        handle_conversation_message(message, &mut manager, &persistent).await;
                    }
                    None => {
                        flush_store(&mut manager, &persistent).await;
                        tracing::info!("Conversation actor channel closed, shutting down");
                        break;
                    }
                }
            }

            _ = flush_timer.tick() => {
                flush_store(&mut manager, &persistent).await;
                tracing::debug!("History saved automatically");
            }
        }
    }
}

async fn handle_conversation_message(
    message: ConversationMessage,
    manager: &mut HistoryManager,
    persistent: &PersistentStore,
) {
    match message {
        ConversationMessage::AppendUser {
            user_id,
            text,
            response,
        } => {
            manager.append_user_turn(&user_id, text);
            let _ = response.send(());
        }
        ConversationMessage::AppendAssistant {
            user_id,
            text,
            response,
        } => {
            manager.append_assistant_turn(&user_id, text);
            flush_store(manager, persistent).await;
            let _ = response.send(());
        }
        ConversationMessage::DiscardPending { user_id, response } => {
            let rollback = manager.discard_pending_turn(&user_id);
            if rollback == Rollback::Flushed {
                tracing::debug!(
                    "Rewriting snapshot without discarded turn of {}",
                    user_id
                );
                flush_store(manager, persistent).await;
            }
            let _ = response.send(rollback != Rollback::Nothing);
        }
        ConversationMessage::GetContext { user_id, response } => {
            let _ = response.send(manager.get_context(&user_id));
        }
        ConversationMessage::Snapshot(response) => {
            let _ = response.send(manager.snapshot().clone());
        }
        ConversationMessage::Users(response) => {
            let _ = response.send(manager.users());
        }
        ConversationMessage::Flush(response) => {
            flush_store(manager, persistent).await;
            let _ = response.send(());
        }
        ConversationMessage::Shutdown(response) => {
            // Handled by the actor loop; acknowledge anyway.
            let _ = response.send(());
        }
    }
}

async fn flush_store(manager: &mut HistoryManager, persistent: &PersistentStore) {
    if persistent.flush(manager.snapshot()).await {
        manager.mark_flushed();
    }
}
