mod memory;
mod redis;

pub use self::memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

use async_trait::async_trait;
use log::info;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::models::{ Conversation, Role };

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history backend error: {0}")]
    Backend(String),
    #[error("corrupt history entry: {0}")]
    Corrupt(String),
    #[error("Unsupported history store type: {0}")]
    UnsupportedType(String),
}

impl From<::redis::RedisError> for HistoryError {
    fn from(err: ::redis::RedisError) -> Self {
        HistoryError::Backend(err.to_string())
    }
}

/// Append-only chat log keyed by card id.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(&self, card_id: i64, role: Role, content: &str) -> Result<(), HistoryError>;

    /// All messages for `card_id`, oldest first.
    async fn get_conversation(&self, card_id: i64) -> Result<Conversation, HistoryError>;

    async fn clear(&self, card_id: i64) -> Result<(), HistoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryType {
    Memory,
    Redis,
}

impl FromStr for HistoryType {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(HistoryType::Memory),
            "redis" => Ok(HistoryType::Redis),
            _ => Err(HistoryError::UnsupportedType(s.to_string())),
        }
    }
}

pub fn create_history_store(args: &Args) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match args.history_type.parse::<HistoryType>()? {
        HistoryType::Memory => Ok(Arc::new(MemoryHistoryStore::new())),
        HistoryType::Redis => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
    }
}

pub fn initialize_history_store(args: &Args) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    create_history_store(args)
}

/// Conversation rendered as plain text for the summary and generation
/// prompts: the card first, then each message labelled `You:` or `AI:`.
pub fn format_conversation_text(card_content: &str, conversation: &Conversation) -> String {
    let mut result = format!("Flashcard: {}\n\nConversation:\n", card_content);
    for msg in &conversation.messages {
        let speaker = match msg.role {
            Role::User => "You",
            Role::Assistant => "AI",
        };
        result.push_str(&format!("{}: {}\n\n", speaker, msg.content));
    }
    result
}
