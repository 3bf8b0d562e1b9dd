//! Speech provider clients.

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::{SpeechSynthesizer, require_text};
use crate::error::SpeechError;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const ZYPHRA_TTS_URL: &str = "https://api.zyphra.com/v1/audio/text-to-speech";

/// OpenAI `audio/speech`.
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    voice: String,
    base_url: String,
}

impl OpenAiSpeech {
    pub fn new(api_key: SecretString, model: String, voice: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            voice,
            base_url: OPENAI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct OpenAiSpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError> {
        let text = require_text(text)?;
        let body = OpenAiSpeechBody {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: "mp3",
        };
        debug!(model = %self.model, chars = text.len(), "Synthesizing speech");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(self.name(), e.to_string()))?;
        read_audio(self.name(), response).await
    }
}

/// Zyphra text-to-speech.
pub struct ZyphraSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
}

impl ZyphraSpeech {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            url: ZYPHRA_TTS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Serialize)]
struct ZyphraBody<'a> {
    text: &'a str,
    speaking_rate: u32,
    language_iso_code: &'a str,
    mime_type: &'a str,
}

impl<'a> ZyphraBody<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            speaking_rate: 15,
            language_iso_code: "en-us",
            mime_type: "audio/mp3",
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ZyphraSpeech {
    fn name(&self) -> &str {
        "zyphra"
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes, SpeechError> {
        let text = require_text(text)?;
        debug!(chars = text.len(), "Synthesizing speech");

        let response = self
            .client
            .post(&self.url)
            .header("X-API-Key", self.api_key.expose_secret())
            .json(&ZyphraBody::new(text))
            .send()
            .await
            .map_err(|e| failed(self.name(), e.to_string()))?;
        read_audio(self.name(), response).await
    }
}

fn failed(provider: &str, reason: String) -> SpeechError {
    SpeechError::RequestFailed {
        provider: provider.to_string(),
        reason,
    }
}

async fn read_audio(provider: &str, response: reqwest::Response) -> Result<Bytes, SpeechError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Could not read error response".to_string());
        return Err(failed(provider, format!("HTTP {status} - {body}")));
    }
    response
        .bytes()
        .await
        .map_err(|e| failed(provider, format!("Failed to read audio: {e}")))
}
