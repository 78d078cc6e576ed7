pub mod llm;
pub mod turn;

pub use llm::{CompletionGateway, LLMClient};
pub use turn::{ConversationHistory, ConversationStore, ConversationTurn, Role};
