pub mod chat;

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Failures of a chat-completion exchange.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed with status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("request timed out")]
    Timeout,
    #[error("no response received")]
    EmptyResponse,
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            LlmError::Status { status: status.as_u16(), body: err.to_string() }
        } else {
            LlmError::Connect(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub url: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: DEFAULT_CHAT_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}
