use std::time::Duration;

use chatgpt::config::ChatGPTEngine;
use log::warn;

use crate::error::ConfigError;

const DEFAULT_DATABASE_URL: &str = "sqlite://tutor.sqlite";
const DEFAULT_DIALOGUE_STATE_DB: &str = "dialogue_state.sqlite";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_EXCHANGES: u32 = 10;
pub const DEFAULT_WORD_COUNT: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub chatgpt_api_key: String,
    pub engine: ChatGPTEngine,
    pub request_timeout: Duration,
    pub database_url: String,
    pub dialogue_state_db: String,
    pub max_exchanges: u32,
    pub vocabulary_word_count: usize,
}

impl Config {
    /// Reads the configuration from the process environment. `.env` has to be
    /// loaded by the caller beforehand.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chatgpt_api_key = std::env::var("CHATGPT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("CHATGPT_API_KEY"))?;

        let engine = std::env::var("CHATGPT_MODEL")
            .map(|model| engine_from_name(&model))
            .unwrap_or(ChatGPTEngine::Gpt35Turbo);

        Ok(Self {
            chatgpt_api_key,
            engine,
            request_timeout: Duration::from_secs(parse_var(
                "CHATGPT_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            database_url: std::env::var("TUTOR_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            dialogue_state_db: std::env::var("DIALOGUE_STATE_DB")
                .unwrap_or_else(|_| DEFAULT_DIALOGUE_STATE_DB.to_string()),
            max_exchanges: parse_var("DIALOGUE_MAX_EXCHANGES", DEFAULT_MAX_EXCHANGES)?,
            vocabulary_word_count: parse_var("VOCABULARY_WORD_COUNT", DEFAULT_WORD_COUNT)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn engine_from_name(name: &str) -> ChatGPTEngine {
    let name = name.trim().to_lowercase();
    if name.starts_with("gpt-4") {
        ChatGPTEngine::Gpt4
    } else if name.starts_with("gpt-3.5") {
        ChatGPTEngine::Gpt35Turbo
    } else {
        warn!("Unknown CHATGPT_MODEL {:?}, falling back to gpt-3.5-turbo", name);
        ChatGPTEngine::Gpt35Turbo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_names_map_to_engines() {
        assert!(matches!(engine_from_name("gpt-4"), ChatGPTEngine::Gpt4));
        assert!(matches!(engine_from_name(" GPT-4-0613 "), ChatGPTEngine::Gpt4));
        assert!(matches!(
            engine_from_name("gpt-3.5-turbo"),
            ChatGPTEngine::Gpt35Turbo
        ));
        assert!(matches!(
            engine_from_name("llama"),
            ChatGPTEngine::Gpt35Turbo
        ));
    }
}
