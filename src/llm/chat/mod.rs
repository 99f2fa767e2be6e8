pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures::Stream;
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;

use super::{ LlmConfig, LlmError };
use self::openai::OpenAIChatClient;

/// Raw response body chunks of a streamed completion.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LlmError>> + Send>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

impl RequestMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Body of a chat-completions request.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    pub fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self
    }

    pub fn single_response(mut self) -> Self {
        self.stream = None;
        self
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends `request` with streaming enabled and returns the raw event-stream
    /// body. Non-success statuses are reported here, before any chunk.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, LlmError>;

    /// Sends `request` without streaming and returns `choices[0].message.content`.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    fn endpoint(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
