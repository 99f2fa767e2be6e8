use async_trait::async_trait;
use crate::models::{ ChatMessage, Conversation, Role };
use crate::history::{ HistoryError, HistoryStore };
use chrono::Utc;
use log::error;
use redis::{ Client, AsyncCommands };

/// One redis list per card, appended with RPUSH so list order is log order.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
}

impl RedisHistoryStore {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self, HistoryError> {
        Ok(Self {
            client: Client::open(url)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, card_id: i64) -> String {
        format!("{}{}", self.key_prefix, card_id)
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn add_message(&self, card_id: i64, role: Role, content: &str) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;

        let message = ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };

        let json_msg = serde_json
            ::to_string(&message)
            .map_err(|e| HistoryError::Corrupt(e.to_string()))?;
        let _: i64 = conn.rpush(self.key(card_id), &json_msg).await?;
        Ok(())
    }

    async fn get_conversation(&self, card_id: i64) -> Result<Conversation, HistoryError> {
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn.lrange(self.key(card_id), 0, -1).await?;
        let mut messages = Vec::with_capacity(json_entries.len());

        for json_entry in &json_entries {
            match serde_json::from_str::<ChatMessage>(json_entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    error!("Error parsing history entry for card {}: {}", card_id, e);
                }
            }
        }

        Ok(Conversation { card_id, messages })
    }

    async fn clear(&self, card_id: i64) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.del(self.key(card_id)).await?;
        Ok(())
    }
}
