//! Outbound WhatsApp messaging and motivation audio files.

pub mod audio;
pub mod twilio;

pub use audio::AudioStore;
pub use twilio::TwilioWhatsApp;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MessagingError;

/// Sends a message, optionally with one media attachment.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, body: &str, media_url: Option<&str>) -> Result<(), MessagingError>;
}

/// A sender bound to the user's own number.
#[derive(Clone)]
pub struct WhatsAppChannel {
    pub sender: Arc<dyn MessageSender>,
    pub to: String,
}

impl WhatsAppChannel {
    pub fn new(sender: Arc<dyn MessageSender>, to: impl Into<String>) -> Self {
        Self {
            sender,
            to: to.into(),
        }
    }

    pub async fn send(&self, body: &str, media_url: Option<&str>) -> Result<(), MessagingError> {
        self.sender.send(&self.to, body, media_url).await
    }
}

/// Click-to-chat link that opens WhatsApp with `text` prefilled.
pub fn whatsapp_link(number: &str, text: &str) -> String {
    let number: String = number.chars().filter(char::is_ascii_digit).collect();
    format!("https://wa.me/{number}?text={}", urlencoding::encode(text))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// One recorded send: recipient, body, media URL.
    pub type SentMessage = (String, String, Option<String>);

    /// Records sends; can fail text-only or media messages.
    #[derive(Default)]
    pub struct StubSender {
        pub fail_text: bool,
        pub fail_media: bool,
        pub sent: Mutex<Vec<SentMessage>>,
    }

    #[async_trait]
    impl MessageSender for StubSender {
        async fn send(&self, to: &str, body: &str, media_url: Option<&str>) -> Result<(), MessagingError> {
            let fail = if media_url.is_some() { self.fail_media } else { self.fail_text };
            if fail {
                return Err(MessagingError::SendFailed {
                    provider: "stub".into(),
                    reason: "rejected".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string(), media_url.map(str::to_string)));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_encodes_text() {
        assert_eq!(
            whatsapp_link("+33 6 12 34 56 78", "Go!\n\nToday's Events:\n• 09:00 - Gym"),
            "https://wa.me/33612345678?text=Go%21%0A%0AToday%27s%20Events%3A%0A%E2%80%A2%2009%3A00%20-%20Gym"
        );
    }
}
