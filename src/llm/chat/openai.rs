use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ ByteStream, ChatClient, ChatRequest };
use crate::llm::{ LlmConfig, LlmError };

pub struct OpenAIChatClient {
    http: HttpClient,
    url: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|e|
                LlmError::InvalidConfig(format!("Invalid API key format: {}", e))
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig("OpenAI API key is required".to_string()));
        }
        Self::new(config)
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let resp = self.http.post(&self.url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, LlmError> {
        let request = request.clone().streaming();
        info!(
            "Opening chat stream: model={}, messages={}, temperature={}",
            request.model,
            request.messages.len(),
            request.temperature
        );
        let resp = self.send(&request).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            while let Some(chunk_result) = stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        debug!("Chat stream raw chunk: {} bytes", chunk.len());
                        if tx.send(Ok(chunk.to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::from(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let request = request.clone().single_response();
        let resp = self.send(&request).await?.json::<OpenAIResponse>().await?;

        let content = resp.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
