mod settings;

pub use settings::{
    ConversationConfig, LLMConfig, LoggingConfig, Settings, StorageConfig, SystemConfig,
    APOLOGY_REPLY, DEFAULT_ENDPOINT, DEFAULT_MODEL, FALLBACK_INSTRUCTION,
};
