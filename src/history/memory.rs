use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::history::{ HistoryError, HistoryStore };
use crate::models::{ ChatMessage, Conversation, Role };

/// Process-local history, lost on exit.
#[derive(Default)]
pub struct MemoryHistoryStore {
    logs: RwLock<HashMap<i64, Vec<ChatMessage>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn add_message(&self, card_id: i64, role: Role, content: &str) -> Result<(), HistoryError> {
        let message = ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.logs.write().await.entry(card_id).or_default().push(message);
        Ok(())
    }

    async fn get_conversation(&self, card_id: i64) -> Result<Conversation, HistoryError> {
        let messages = self.logs.read().await.get(&card_id).cloned().unwrap_or_default();
        Ok(Conversation { card_id, messages })
    }

    async fn clear(&self, card_id: i64) -> Result<(), HistoryError> {
        self.logs.write().await.remove(&card_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_cards_apart_and_clears_one() {
        let store = MemoryHistoryStore::new();
        store.add_message(1, Role::User, "a").await.unwrap();
        store.add_message(2, Role::User, "b").await.unwrap();
        store.add_message(1, Role::Assistant, "c").await.unwrap();

        let one = store.get_conversation(1).await.unwrap();
        let contents: Vec<&str> = one.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "c"]);
        assert!(one.messages[0].timestamp <= one.messages[1].timestamp);

        store.clear(1).await.unwrap();
        assert!(store.get_conversation(1).await.unwrap().is_empty());
        assert_eq!(store.get_conversation(2).await.unwrap().len(), 1);
    }
}
