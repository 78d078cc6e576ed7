use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Reply sent to the user when a completion cannot be produced.
pub const APOLOGY_REPLY: &str = "Sorry, I'm having trouble responding right now.";

/// System instruction used when the instructions file cannot be read.
pub const FALLBACK_INSTRUCTION: &str =
    "You are a helpful assistant that answers in a natural and friendly way.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LLMConfig,
    pub storage: StorageConfig,
    pub conversation: ConversationConfig,
    pub system: SystemConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub history_file: PathBuf,
    pub instructions_file: PathBuf,
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// A history longer than this is truncated.
    pub max_turns: usize,
    /// Number of most recent turns kept by a truncation.
    pub retain_turns: usize,
    pub apology_reply: String,
    pub fallback_instruction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub channel_buffer_size: usize,
    /// A user's lane task exits after this long without messages.
    pub lane_idle_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LLMConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                model: DEFAULT_MODEL.to_string(),
                max_tokens: 500,
                temperature: 0.7,
                timeout_secs: 60,
            },
            storage: StorageConfig {
                history_file: PathBuf::from("conversations.json"),
                instructions_file: PathBuf::from("instructions.txt"),
                flush_interval_secs: 30,
            },
            conversation: ConversationConfig {
                max_turns: 20,
                retain_turns: 10,
                apology_reply: APOLOGY_REPLY.to_string(),
                fallback_instruction: FALLBACK_INSTRUCTION.to_string(),
            },
            system: SystemConfig {
                channel_buffer_size: 100,
                lane_idle_secs: 300,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Layered load: built-in defaults, `config/{CONFIG_ENV}`, `APP__*`
    /// variables, then the plain `API_ENDPOINT` / `API_MODEL` variables.
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .set_override_option("llm.endpoint", env::var("API_ENDPOINT").ok())?
            .set_override_option("llm.model", env::var("API_MODEL").ok())?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let conversation = &self.conversation;
        if conversation.retain_turns == 0 || conversation.retain_turns > conversation.max_turns {
            return Err(ConfigError::Message(format!(
                "conversation.retain_turns must be between 1 and max_turns ({}), got {}",
                conversation.max_turns, conversation.retain_turns
            )));
        }
        if self.storage.flush_interval_secs == 0 {
            return Err(ConfigError::Message(
                "storage.flush_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.system.channel_buffer_size == 0 {
            return Err(ConfigError::Message(
                "system.channel_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.system.lane_idle_secs == 0 {
            return Err(ConfigError::Message(
                "system.lane_idle_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Bearer credential for the completion endpoint, if configured.
    pub fn api_key() -> Option<String> {
        env::var("API_KEY").ok().filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.conversation.max_turns, 20);
        assert_eq!(settings.conversation.retain_turns, 10);
        assert_eq!(settings.storage.flush_interval_secs, 30);
        assert_eq!(settings.llm.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_rejects_retain_larger_than_max() {
        let mut settings = Settings::default();
        settings.conversation.retain_turns = 21;
        assert!(settings.validate().is_err());

        settings.conversation.retain_turns = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_flush_interval() {
        let mut settings = Settings::default();
        settings.storage.flush_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_lane_idle_timeout() {
        let mut settings = Settings::default();
        settings.system.lane_idle_secs = 0;
        assert!(settings.validate().is_err());
    }
}
