//! Relay - drives each inbound message through the conversation flow
//!
//! Information Hiding:
//! - Per-user lanes keep one user's messages strictly ordered while other
//!   users proceed concurrently
//! - Idle lanes retire on their own; the next message starts a fresh one
//! - Every failure degrades to a logged error plus the apology reply

use crate::actors::conversation_actor::ConversationHandle;
use crate::actors::messages::{TurnOutcome, TurnState};
use crate::channels::{InboundMessage, MessageChannel};
use crate::config::Settings;
use crate::conversation::{InstructionsFile, PromptAssembler, TruncationPolicy};
use crate::core::llm::{CompletionGateway, LLMClient};
use crate::storage::{JsonFileStorage, PersistentStore};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{unbounded_channel, Receiver, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};

const DEFAULT_LANE_IDLE: Duration = Duration::from_secs(300);

pub struct Relay {
    conversations: ConversationHandle,
    assembler: PromptAssembler,
    gateway: Arc<dyn CompletionGateway>,
    channel: Arc<dyn MessageChannel>,
    apology_reply: String,
    lane_idle_timeout: Duration,
}

/// One user's queue of pending texts and the task working through it.
struct Lane {
    sender: UnboundedSender<String>,
    worker: JoinHandle<()>,
}

impl Relay {
    pub fn new(
        conversations: ConversationHandle,
        assembler: PromptAssembler,
        gateway: Arc<dyn CompletionGateway>,
        channel: Arc<dyn MessageChannel>,
        apology_reply: impl Into<String>,
    ) -> Self {
        Self {
            conversations,
            assembler,
            gateway,
            channel,
            apology_reply: apology_reply.into(),
            lane_idle_timeout: DEFAULT_LANE_IDLE,
        }
    }

    pub fn with_lane_idle_timeout(mut self, idle: Duration) -> Self {
        self.lane_idle_timeout = idle.max(Duration::from_millis(1));
        self
    }

    /// Wire the file-backed store, instructions file and HTTP gateway
    /// described by `settings`.
    pub async fn from_settings(
        settings: &Settings,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self> {
        let conversations = spawn_conversations(settings).await;
        let assembler = PromptAssembler::new(InstructionsFile::new(
            settings.storage.instructions_file.clone(),
            settings.conversation.fallback_instruction.clone(),
        ));

        let api_key = Settings::api_key();
        if api_key.is_none() {
            tracing::warn!("API_KEY is not set; every completion will fail");
        }
        let gateway = Arc::new(LLMClient::new(api_key, settings.llm.clone())?);

        Ok(Self::new(
            conversations,
            assembler,
            gateway,
            channel,
            settings.conversation.apology_reply.clone(),
        )
        .with_lane_idle_timeout(Duration::from_secs(settings.system.lane_idle_secs)))
    }

    pub fn conversations(&self) -> &ConversationHandle {
        &self.conversations
    }

    pub fn apology_reply(&self) -> &str {
        &self.apology_reply
    }

    /// Run one message through the flow without sending the reply.
    pub async fn process_message(&self, user_id: &str, text: &str) -> TurnOutcome {
        match self.try_process(user_id, text).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Failed to process message from {}: {}", user_id, e);
                self.failed_reply()
            }
        }
    }

    async fn try_process(&self, user_id: &str, text: &str) -> Result<TurnOutcome> {
        trace_state(user_id, TurnState::Received);

        self.conversations.append_user_turn(user_id, text).await?;
        trace_state(user_id, TurnState::ContextAppended);

        let prompt = self
            .assembler
            .build_prompt(user_id, &self.conversations)
            .await?;
        trace_state(user_id, TurnState::PromptBuilt);

        trace_state(user_id, TurnState::AwaitingCompletion);
        let reply = match self.gateway.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Completion failed for {}: {}", user_id, e);
                self.conversations.discard_pending_turn(user_id).await?;
                trace_state(user_id, TurnState::FailedReply);
                return Ok(self.failed_reply());
            }
        };

        // The actor acknowledges only after flushing, so both states are
        // reached together.
        self.conversations
            .append_assistant_turn(user_id, &reply)
            .await?;
        trace_state(user_id, TurnState::ReplyAppended);
        trace_state(user_id, TurnState::Persisted);

        Ok(TurnOutcome {
            reply,
            state: TurnState::Persisted,
        })
    }

    /// Process a message and deliver the reply.
    pub async fn handle_inbound(&self, user_id: &str, text: &str) -> TurnOutcome {
        let mut outcome = self.process_message(user_id, text).await;

        match self.channel.reply(user_id, &outcome.reply).await {
            Ok(()) => {
                if outcome.is_success() {
                    outcome.state = TurnState::Replied;
                    trace_state(user_id, TurnState::Replied);
                }
            }
            Err(e) => {
                tracing::error!(
                    "Failed to deliver reply to {} via {}: {}",
                    user_id,
                    self.channel.name(),
                    e
                );
            }
        }
        outcome
    }

    /// Consume inbound messages until the stream closes, then drain every
    /// lane and flush the store one last time.
    pub async fn run(self: Arc<Self>, mut inbound: Receiver<InboundMessage>) -> Result<()> {
        let mut lanes: HashMap<String, Lane> = HashMap::new();
        let mut sweep = interval(self.lane_idle_timeout);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Relay started on {} channel", self.channel.name());

        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else { break };
                    tracing::info!(
                        "Message received from {}: {}",
                        message.user_id,
                        message.text
                    );
                    self.dispatch(&mut lanes, message);
                }

                _ = sweep.tick() => {
                    lanes.retain(|_, lane| !lane.worker.is_finished());
                }
            }
        }

        // Dropping each sender lets its worker finish the queue and exit.
        let workers: Vec<JoinHandle<()>> = lanes.into_values().map(|lane| lane.worker).collect();
        for worker in workers {
            join_lane(worker).await;
        }

        self.conversations.shutdown().await?;
        tracing::info!("Relay stopped");
        Ok(())
    }

    /// Queue the text on the user's lane without waiting, starting a lane
    /// if there is none or the old one has retired.
    fn dispatch(self: &Arc<Self>, lanes: &mut HashMap<String, Lane>, message: InboundMessage) {
        let InboundMessage { user_id, text } = message;

        let text = match lanes.get(&user_id) {
            Some(lane) => match lane.sender.send(text) {
                Ok(()) => return,
                Err(SendError(text)) => text,
            },
            None => text,
        };

        let previous = lanes.remove(&user_id).map(|lane| lane.worker);
        let (sender, receiver) = unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = sender.send(text);
        let worker = tokio::spawn(user_lane(
            self.clone(),
            user_id.clone(),
            receiver,
            previous,
            self.lane_idle_timeout,
        ));
        lanes.insert(user_id, Lane { sender, worker });
    }

    fn failed_reply(&self) -> TurnOutcome {
        TurnOutcome {
            reply: self.apology_reply.clone(),
            state: TurnState::FailedReply,
        }
    }
}

async fn user_lane(
    relay: Arc<Relay>,
    user_id: String,
    mut receiver: UnboundedReceiver<String>,
    previous: Option<JoinHandle<()>>,
    idle: Duration,
) {
    // A retiring lane may still be draining its queue.
    if let Some(previous) = previous {
        join_lane(previous).await;
    }

    loop {
        match timeout(idle, receiver.recv()).await {
            Ok(Some(text)) => {
                relay.handle_inbound(&user_id, &text).await;
            }
            Ok(None) => return,
            Err(_) => break,
        }
    }

    // Texts queued before the close are still ours.
    receiver.close();
    while let Some(text) = receiver.recv().await {
        relay.handle_inbound(&user_id, &text).await;
    }
    tracing::debug!("Retired idle lane for {}", user_id);
}

async fn join_lane(worker: JoinHandle<()>) {
    if let Err(e) = worker.await {
        tracing::error!("User lane terminated abnormally: {}", e);
    }
}

async fn spawn_conversations(settings: &Settings) -> ConversationHandle {
    let storage = Arc::new(JsonFileStorage::new(settings.storage.history_file.clone()));
    ConversationHandle::spawn(
        PersistentStore::new(storage),
        TruncationPolicy::from_config(&settings.conversation),
        Duration::from_secs(settings.storage.flush_interval_secs),
        settings.system.channel_buffer_size,
    )
    .await
}

fn trace_state(user_id: &str, state: TurnState) {
    tracing::trace!("[{}] {:?}", user_id, state);
}
