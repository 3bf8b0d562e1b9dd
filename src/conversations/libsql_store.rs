//! libSQL-backed conversation store.
//!
//! One row per conversation; messages are kept as a JSON array so their
//! order is exactly the order the client sent.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::migrations;
use super::model::{Conversation, Message};
use super::store::ConversationStore;
use crate::error::StorageError;

pub struct LibSqlConversationStore {
    // The database must outlive its connection.
    _db: libsql::Database,
    conn: Connection,
    /// Serializes multi-statement writes on the shared connection.
    write_lock: Mutex<()>,
}

impl LibSqlConversationStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Open(format!("Failed to create database directory: {e}")))?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to open libSQL database: {e}")))?;
        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Conversation database opened");
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: libsql::Database) -> Result<Self, StorageError> {
        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            _db: db,
            conn,
            write_lock: Mutex::new(()),
        })
    }

    async fn count(&self, user_id: &str) -> Result<i64, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM conversations WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("count: {e}")))?;
        match rows.next().await.map_err(|e| StorageError::Query(format!("count: {e}")))? {
            Some(row) => row.get::<i64>(0).map_err(|e| StorageError::Query(format!("count: {e}"))),
            None => Ok(0),
        }
    }
}

fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, StorageError> {
    let read = |e: libsql::Error| StorageError::Query(format!("read row: {e}"));
    let messages_json: String = row.get(3).map_err(read)?;
    let messages: Vec<Message> = serde_json::from_str(&messages_json)
        .map_err(|e| StorageError::Serialization(format!("messages: {e}")))?;
    Ok(Conversation {
        id: row.get(0).map_err(read)?,
        title: row.get(1).map_err(read)?,
        created_at: row.get(2).map_err(read)?,
        messages,
    })
}

fn messages_json(conversation: &Conversation) -> Result<String, StorageError> {
    serde_json::to_string(&conversation.messages)
        .map_err(|e| StorageError::Serialization(format!("messages: {e}")))
}

#[async_trait]
impl ConversationStore for LibSqlConversationStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, created_at, messages FROM conversations
                 WHERE user_id = ?1 ORDER BY position ASC",
                params![user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("list: {e}")))?;

        let mut conversations = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("list: {e}")))?
        {
            conversations.push(row_to_conversation(&row)?.clear_voice_flags());
        }
        Ok(conversations)
    }

    async fn replace_all(&self, user_id: &str, conversations: Vec<Conversation>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StorageError::Query(format!("begin: {e}")))?;

        tx.execute("DELETE FROM conversations WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| StorageError::Query(format!("replace_all: {e}")))?;

        for (position, conversation) in conversations.iter().enumerate() {
            tx.execute(
                "INSERT INTO conversations (user_id, id, position, title, created_at, messages)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user_id,
                    conversation.id.as_str(),
                    position as i64,
                    conversation.title.as_str(),
                    conversation.created_at.as_str(),
                    messages_json(conversation)?
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("replace_all: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(format!("commit: {e}")))?;
        debug!(user_id, count = conversations.len(), "Conversations replaced");
        Ok(())
    }

    async fn create(&self, user_id: &str) -> Result<Conversation, StorageError> {
        let _guard = self.write_lock.lock().await;
        let existing = self.count(user_id).await?;
        let conversation = Conversation::numbered(usize::try_from(existing).unwrap_or_default());

        self.conn
            .execute(
                "INSERT INTO conversations (user_id, id, position, title, created_at, messages)
                 VALUES (?1, ?2,
                         (SELECT COALESCE(MAX(position), -1) + 1 FROM conversations WHERE user_id = ?1),
                         ?3, ?4, ?5)",
                params![
                    user_id,
                    conversation.id.as_str(),
                    conversation.title.as_str(),
                    conversation.created_at.as_str(),
                    messages_json(&conversation)?
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("create: {e}")))?;
        Ok(conversation)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let affected = self
            .conn
            .execute(
                "DELETE FROM conversations WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("delete: {e}")))?;
        Ok(affected > 0)
    }
}
