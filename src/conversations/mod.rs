//! Per-user chat conversation storage.

pub mod libsql_store;
mod migrations;
pub mod model;
pub mod routes;
pub mod store;

pub use libsql_store::LibSqlConversationStore;
pub use model::{Conversation, Message, MessageRole};
pub use store::{ConversationStore, MemoryConversationStore};

use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;

/// File-backed store when a path is configured, in-memory otherwise.
pub async fn open_store(path: Option<&Path>) -> Result<Arc<dyn ConversationStore>, StorageError> {
    match path {
        Some(path) => Ok(Arc::new(LibSqlConversationStore::new_local(path).await?)),
        None => {
            tracing::info!("No DATABASE_PATH set, conversations are kept in memory");
            Ok(Arc::new(MemoryConversationStore::new()))
        }
    }
}
