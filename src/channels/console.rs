use super::{InboundMessage, MessageChannel};
use crate::utils;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;

/// Local stand-in for a chat transport: stdin lines in, stdout replies out.
///
/// A line starting with `@name ` is sent as user `name`; other lines use the
/// default user.
pub struct ConsoleChannel {
    default_user: String,
}

impl ConsoleChannel {
    pub fn new(default_user: impl Into<String>) -> Self {
        Self {
            default_user: default_user.into(),
        }
    }

    pub fn parse_line(&self, line: &str) -> Option<InboundMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = line.strip_prefix('@') {
            if let Some((user, text)) = rest.split_once(char::is_whitespace) {
                let text = text.trim();
                if !user.is_empty() && !text.is_empty() {
                    return Some(InboundMessage::new(user, text));
                }
            }
        }

        Some(InboundMessage::new(self.default_user.clone(), line))
    }

    /// Read stdin until EOF. Dropping `sender` on return ends the relay.
    pub async fn read_stdin(&self, sender: Sender<InboundMessage>) -> Result<()> {
        let mut lines = BufReader::new(io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            if let Some(message) = self.parse_line(&line) {
                if sender.send(message).await.is_err() {
                    tracing::warn!("Relay stopped accepting messages");
                    break;
                }
            }
        }

        tracing::info!("Console input closed");
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn reply(&self, user_id: &str, text: &str) -> Result<()> {
        utils::print_reply(user_id, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_uses_default_user() {
        let channel = ConsoleChannel::new("console");
        assert_eq!(
            channel.parse_line("  hello there \n"),
            Some(InboundMessage::new("console", "hello there"))
        );
    }

    #[test]
    fn test_mention_selects_user() {
        let channel = ConsoleChannel::new("console");
        assert_eq!(
            channel.parse_line("@alice what's up?"),
            Some(InboundMessage::new("alice", "what's up?"))
        );
        // A bare mention is just text.
        assert_eq!(
            channel.parse_line("@alice"),
            Some(InboundMessage::new("console", "@alice"))
        );
    }

    #[test]
    fn test_blank_line_is_skipped() {
        let channel = ConsoleChannel::new("console");
        assert_eq!(channel.parse_line("   "), None);
    }
}
