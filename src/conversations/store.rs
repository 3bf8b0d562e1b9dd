//! Conversation storage trait and the in-memory backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::model::Conversation;
use crate::error::StorageError;

/// Per-user conversation lists. Every backend preserves list order and
/// message order.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The user's conversations, with voice flags cleared.
    async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, StorageError>;

    /// Replace the user's whole list.
    async fn replace_all(&self, user_id: &str, conversations: Vec<Conversation>) -> Result<(), StorageError>;

    /// Append a new empty conversation and return it.
    async fn create(&self, user_id: &str) -> Result<Conversation, StorageError>;

    /// Remove one conversation. `false` when it did not exist.
    async fn delete(&self, user_id: &str, id: &str) -> Result<bool, StorageError>;
}

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryConversationStore {
    users: RwLock<HashMap<String, Vec<Conversation>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, StorageError> {
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .map(|list| list.iter().cloned().map(Conversation::clear_voice_flags).collect())
            .unwrap_or_default())
    }

    async fn replace_all(&self, user_id: &str, conversations: Vec<Conversation>) -> Result<(), StorageError> {
        self.users
            .write()
            .await
            .insert(user_id.to_string(), conversations);
        Ok(())
    }

    async fn create(&self, user_id: &str) -> Result<Conversation, StorageError> {
        let mut users = self.users.write().await;
        let list = users.entry(user_id.to_string()).or_default();
        let conversation = Conversation::numbered(list.len());
        list.push(conversation.clone());
        Ok(conversation)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<bool, StorageError> {
        let mut users = self.users.write().await;
        let Some(list) = users.get_mut(user_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|c| c.id != id);
        Ok(list.len() != before)
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share.

    use super::*;
    use crate::conversations::model::{Message, MessageRole};

    fn message(role: MessageRole, content: &str, from_voice: bool) -> Message {
        Message {
            role,
            content: content.to_string(),
            timestamp: "2024-04-05T10:00:00.000Z".to_string(),
            from_voice: Some(from_voice),
            is_complete: None,
            requires_audio: None,
        }
    }

    fn conversation(id: &str, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: format!("Chat {id}"),
            messages,
            created_at: "2024-04-05T09:00:00.000Z".to_string(),
        }
    }

    pub async fn preserves_order_and_clears_voice(store: &dyn ConversationStore) {
        let list = vec![
            conversation(
                "b",
                vec![
                    message(MessageRole::User, "first", true),
                    message(MessageRole::Assistant, "second", false),
                    message(MessageRole::User, "third", false),
                ],
            ),
            conversation("a", vec![]),
        ];
        store.replace_all("user_1", list).await.unwrap();

        let loaded = store.list("user_1").await.unwrap();
        assert_eq!(loaded.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
        let contents: Vec<_> = loaded[0].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(loaded[0].messages.iter().all(|m| m.from_voice == Some(false)));

        assert!(store.list("user_2").await.unwrap().is_empty());
    }

    pub async fn replace_overwrites(store: &dyn ConversationStore) {
        store
            .replace_all("user_1", vec![conversation("a", vec![]), conversation("b", vec![])])
            .await
            .unwrap();
        store
            .replace_all("user_1", vec![conversation("c", vec![])])
            .await
            .unwrap();
        let loaded = store.list("user_1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
    }

    pub async fn create_appends_numbered(store: &dyn ConversationStore) {
        store
            .replace_all("user_1", vec![conversation("a", vec![])])
            .await
            .unwrap();
        let created = store.create("user_1").await.unwrap();
        assert_eq!(created.title, "New Chat 2");

        let loaded = store.list("user_1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].id, created.id);

        let other = store.create("user_2").await.unwrap();
        assert_eq!(other.title, "New Chat 1");
    }

    pub async fn delete_reports_absence(store: &dyn ConversationStore) {
        store
            .replace_all("user_1", vec![conversation("a", vec![]), conversation("b", vec![])])
            .await
            .unwrap();
        assert!(store.delete("user_1", "a").await.unwrap());
        assert!(!store.delete("user_1", "a").await.unwrap());
        assert!(!store.delete("user_2", "b").await.unwrap());
        assert_eq!(store.list("user_1").await.unwrap().len(), 1);
    }
}
