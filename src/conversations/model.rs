//! Chat conversation shapes, as exchanged with the browser.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// RFC 3339, set by the client.
    #[serde(default)]
    pub timestamp: String,
    /// The message was dictated; the client auto-plays the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_voice: Option<bool>,
    /// The assistant reply has finished streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_audio: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: String,
}

impl Conversation {
    /// Empty conversation titled after its position in the list.
    pub fn numbered(existing: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: format!("New Chat {}", existing + 1),
            messages: Vec::new(),
            created_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }

    /// Voice playback is per page load: a reloaded conversation never
    /// auto-plays old replies.
    pub fn clear_voice_flags(mut self) -> Self {
        for message in &mut self.messages {
            message.from_voice = Some(false);
        }
        self
    }
}
