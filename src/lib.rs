//! Relaybot - chat relay with per-user LLM conversation context
//!
//! Inbound chat messages are forwarded, together with the sender's recent
//! history and a system instruction, to a chat-completions endpoint. The
//! reply is recorded in the history, persisted to a JSON snapshot and sent
//! back to the sender.

pub mod actors;
pub mod channels;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;

pub use actors::{ConversationHandle, Relay, TurnOutcome, TurnState};
pub use channels::{InboundMessage, MessageChannel};
pub use config::Settings;
pub use conversation::{HistoryManager, InstructionsFile, PromptAssembler, TruncationPolicy};
pub use crate::core::{CompletionGateway, ConversationStore, ConversationTurn, LLMClient, Role};
pub use error::{GatewayError, RelayError, StorageError};
pub use storage::{ConversationStorage, PersistentStore};
