//! Twilio WhatsApp sender.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::MessageSender;
use crate::config::TwilioConfig;
use crate::error::MessagingError;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioWhatsApp {
    client: reqwest::Client,
    account_sid: String,
    auth_token: SecretString,
    from: String,
    base_url: String,
}

impl TwilioWhatsApp {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from: whatsapp_address(&config.from_number),
            base_url: TWILIO_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.base_url, self.account_sid)
    }
}

#[async_trait]
impl MessageSender for TwilioWhatsApp {
    async fn send(&self, to: &str, body: &str, media_url: Option<&str>) -> Result<(), MessagingError> {
        let to = whatsapp_address(to);
        let form = message_form(&self.from, &to, body, media_url);
        debug!(to = %to, has_media = media_url.is_some(), "Sending WhatsApp message");

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| MessagingError::SendFailed {
                provider: "twilio".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(MessagingError::SendFailed {
                provider: "twilio".to_string(),
                reason: format!("HTTP {status} - {body}"),
            });
        }

        info!(to = %to, "WhatsApp message sent");
        Ok(())
    }
}

/// Twilio addresses WhatsApp numbers as `whatsapp:+<number>`.
fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

fn message_form<'a>(
    from: &'a str,
    to: &'a str,
    body: &'a str,
    media_url: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut form = vec![("From", from), ("To", to), ("Body", body)];
    if let Some(url) = media_url {
        form.push(("MediaUrl", url));
    }
    form
}
