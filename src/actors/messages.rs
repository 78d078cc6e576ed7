use crate::core::turn::{ConversationHistory, ConversationStore};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum ConversationMessage {
    AppendUser {
        user_id: String,
        text: String,
        response: oneshot::Sender<()>,
    },
    /// Acknowledged only after the follow-up flush attempt.
    AppendAssistant {
        user_id: String,
        text: String,
        response: oneshot::Sender<()>,
    },
    DiscardPending {
        user_id: String,
        response: oneshot::Sender<bool>,
    },
    GetContext {
        user_id: String,
        response: oneshot::Sender<ConversationHistory>,
    },
    Snapshot(oneshot::Sender<ConversationStore>),
    Users(oneshot::Sender<Vec<String>>),
    Flush(oneshot::Sender<()>),
    /// Final flush, then the actor exits.
    Shutdown(oneshot::Sender<()>),
}

/// Steps a single inbound message goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    ContextAppended,
    PromptBuilt,
    AwaitingCompletion,
    ReplyAppended,
    Persisted,
    Replied,
    FailedReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    pub state: TurnState,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.state, TurnState::FailedReply)
    }
}
