//! Per-message audio cache in front of a synthesizer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use super::{SpeechSynthesizer, require_text};
use crate::error::SpeechError;

/// Entries kept before the oldest is evicted.
pub const CACHE_CAPACITY: usize = 20;

/// Longest text the preloader will synthesize ahead of time.
pub const PRELOAD_MAX_CHARS: usize = 1000;

#[derive(Default)]
struct AudioCache {
    entries: HashMap<String, Bytes>,
    order: VecDeque<String>,
}

impl AudioCache {
    fn insert(&mut self, key: String, audio: Bytes, capacity: usize) {
        if self.entries.insert(key.clone(), audio).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Synthesizer wrapper caching audio by message id, oldest entry first out.
pub struct CachedSpeech {
    inner: Arc<dyn SpeechSynthesizer>,
    cache: Mutex<AudioCache>,
    capacity: usize,
}

impl CachedSpeech {
    pub fn new(inner: Arc<dyn SpeechSynthesizer>) -> Self {
        Self::with_capacity(inner, CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: Arc<dyn SpeechSynthesizer>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(AudioCache::default()),
            capacity,
        }
    }

    pub async fn contains(&self, message_id: &str) -> bool {
        self.cache.lock().await.entries.contains_key(message_id)
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.entries.len()
    }

    /// Audio for a message, synthesized on first request.
    pub async fn synthesize(&self, message_id: &str, text: &str) -> Result<Bytes, SpeechError> {
        let text = require_text(text)?;
        if let Some(audio) = self.cache.lock().await.entries.get(message_id) {
            debug!(message_id, "Speech cache hit");
            return Ok(audio.clone());
        }

        let audio = self.inner.synthesize(text).await?;
        self.cache
            .lock()
            .await
            .insert(message_id.to_string(), audio.clone(), self.capacity);
        Ok(audio)
    }

    /// Whether a preload request should trigger synthesis.
    pub async fn should_preload(&self, message_id: &str, text: &str) -> bool {
        !message_id.is_empty()
            && !text.trim().is_empty()
            && text.chars().count() < PRELOAD_MAX_CHARS
            && !self.contains(message_id).await
    }
}
