use thiserror::Error;

use crate::ai_helper::GenerationError;
use crate::quiz::QuizError;

pub type TutorResult<T> = Result<T, TutorError>;

/// Everything a tutor operation can fail with. Handlers turn each variant
/// into a chat message; none of them is fatal for the bot.
#[derive(Debug, Error)]
pub enum TutorError {
    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("could not recognise {what} in the response: {excerpt}")]
    ParseInsufficient { what: &'static str, excerpt: String },

    #[error("{0}")]
    Validation(String),

    #[error("no active {0}")]
    NoActiveSession(&'static str),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}
