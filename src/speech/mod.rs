//! Text-to-speech.
//!
//! Motivation audio always uses OpenAI speech. Chat message playback uses
//! Zyphra when a key is configured, OpenAI otherwise, behind a small
//! per-message cache.

pub mod cache;
pub mod providers;
pub mod routes;

pub use cache::CachedSpeech;
pub use providers::{OpenAiSpeech, ZyphraSpeech};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;

use crate::config::SpeechConfig;
use crate::error::SpeechError;

/// Turns text into MP3 audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError>;
}

/// Synthesizer for chat message playback.
pub fn message_synthesizer(config: &SpeechConfig, openai_key: &SecretString) -> Arc<dyn SpeechSynthesizer> {
    match &config.zyphra_api_key {
        Some(key) => {
            tracing::info!("Message playback uses Zyphra speech");
            Arc::new(ZyphraSpeech::new(key.clone()))
        }
        None => {
            tracing::info!(model = %config.tts_model, voice = %config.tts_voice, "Message playback uses OpenAI speech");
            Arc::new(OpenAiSpeech::new(
                openai_key.clone(),
                config.tts_model.clone(),
                config.tts_voice.clone(),
            ))
        }
    }
}

/// Trimmed text, rejecting empty input.
pub(crate) fn require_text(text: &str) -> Result<&str, SpeechError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SpeechError::EmptyText);
    }
    Ok(text)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Returns `audio:<text>` as the "MP3" and records every call.
    #[derive(Default)]
    pub struct StubSpeech {
        pub fail: bool,
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for StubSpeech {
        fn name(&self) -> &str {
            "stub"
        }

        async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError> {
            let text = require_text(text)?;
            self.calls.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(SpeechError::RequestFailed {
                    provider: "stub".into(),
                    reason: "boom".into(),
                });
            }
            Ok(Bytes::from(format!("audio:{text}")))
        }
    }
}
