//! Messaging transport abstraction
//!
//! Information Hiding:
//! - Transports push `InboundMessage`s into an mpsc channel
//! - Replies go back through `MessageChannel::reply`

use anyhow::Result;
use async_trait::async_trait;

pub mod console;

pub use console::ConsoleChannel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver a reply to `user_id`.
    async fn reply(&self, user_id: &str, text: &str) -> Result<()>;
}
