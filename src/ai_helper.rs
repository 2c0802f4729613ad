use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::config::ModelConfigurationBuilder;
use chatgpt::types::CompletionResponse;
use log::{debug, warn};
use thiserror::Error;

use crate::config::Config;

const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Backend(String),
    #[error("the model returned an empty response")]
    EmptyResponse,
}

/// The only thing the tutor needs from a language model: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;

    /// The backend receives one flat string, so the system instruction is
    /// simply put in front of the prompt.
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> Result<String, GenerationError> {
        let full_prompt = match system_instruction {
            Some(instruction) => format!("{}\n\n{}", instruction, prompt),
            None => prompt.to_string(),
        };

        let text = self.complete(&full_prompt).await?;
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

pub struct ChatGptHelper {
    chat_gpt: ChatGPT,
}

impl ChatGptHelper {
    pub fn new(chat_gpt: ChatGPT) -> Self {
        Self { chat_gpt }
    }

    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        let model_config = ModelConfigurationBuilder::default()
            .engine(config.engine.clone())
            .timeout(config.request_timeout)
            .temperature(TEMPERATURE)
            .build()
            .map_err(|err| GenerationError::Backend(err.to_string()))?;

        let chat_gpt = ChatGPT::new_with_config(&config.chatgpt_api_key, model_config)
            .map_err(|err| GenerationError::Backend(err.to_string()))?;

        Ok(Self::new(chat_gpt))
    }
}

#[async_trait]
impl TextGenerator for ChatGptHelper {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!("Sending prompt ({} chars)", prompt.chars().count());

        let response: CompletionResponse = self
            .chat_gpt
            .send_message(prompt)
            .await
            .map_err(|err| {
                warn!("ChatGPT request failed: {}", err);
                GenerationError::Backend(err.to_string())
            })?;
        let content = response.message().clone().content;

        debug!("Completion: {:?}", content);

        Ok(content)
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned replies in order and remembers every prompt it saw.
    /// Once the script runs out every call fails.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String, GenerationError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: impl Into<String>) -> Self {
            self.replies.lock().unwrap().push_back(Ok(text.into()));
            self
        }

        pub fn fail(self, message: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(GenerationError::Backend(message.to_string())));
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Backend("script exhausted".into())))
        }
    }
}
