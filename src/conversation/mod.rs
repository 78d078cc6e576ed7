pub mod history;
pub mod prompt;

pub use history::{HistoryManager, Rollback, TruncationPolicy, MAX_TURNS, RETAIN_TURNS};
pub use prompt::{InstructionsFile, PromptAssembler};
