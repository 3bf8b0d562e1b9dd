//! Motivation audio saved to disk and served under `/audio`.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use tracing::debug;

use crate::error::MessagingError;

/// URL prefix the audio directory is served under.
pub const AUDIO_URL_PREFIX: &str = "/audio";

#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode base64 MP3 audio and write it to a new file, returning its
    /// public path (`/audio/<file>`).
    pub async fn save(&self, audio_base64: &str, user_id: &str) -> Result<String, MessagingError> {
        let audio = STANDARD
            .decode(audio_base64.trim())
            .map_err(|e| MessagingError::InvalidAudio(e.to_string()))?;
        if audio.is_empty() {
            return Err(MessagingError::InvalidAudio("audio is empty".to_string()));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let filename = format!(
            "motivation-{}-{}.mp3",
            file_safe(user_id),
            Utc::now().timestamp_millis()
        );
        tokio::fs::write(self.dir.join(&filename), &audio).await?;
        debug!(file = %filename, bytes = audio.len(), "Saved motivation audio");
        Ok(format!("{AUDIO_URL_PREFIX}/{filename}"))
    }
}

/// Keep user ids from escaping the audio directory.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
