pub mod conversation_actor;
pub mod messages;
pub mod relay;

pub use conversation_actor::ConversationHandle;
pub use messages::{TurnOutcome, TurnState};
pub use relay::Relay;
