//! Google OAuth 2.0 for calendar access.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use url::Url;

use crate::error::CalendarError;
use crate::tokens::TokenPair;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for calendar access.
pub const CALENDAR_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Fallback lifetime when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// OAuth operations needed by the calendar handlers.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Consent URL; `state` round-trips through the provider to the callback.
    fn authorize_url(&self, state: &str) -> Result<String, CalendarError>;

    /// Exchange an authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenPair, CalendarError>;

    /// Get a fresh access token using the refresh token in `tokens`.
    async fn refresh(&self, tokens: &TokenPair) -> Result<TokenPair, CalendarError>;
}

/// Google's OAuth endpoints.
pub struct GoogleOAuth {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
}

impl GoogleOAuth {
    pub fn new(client_id: String, client_secret: SecretString, redirect_uri: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_uri,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Point the token exchange at another endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenPair, CalendarError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| CalendarError::Token(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(CalendarError::Token(format!("HTTP {status} - {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CalendarError::Token(format!("Failed to parse token response: {e}")))?;
        token_pair_from_response(body, Utc::now().timestamp_millis())
    }
}

#[async_trait]
impl OAuthClient for GoogleOAuth {
    fn authorize_url(&self, state: &str) -> Result<String, CalendarError> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| CalendarError::Request(format!("Failed to parse auth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", &CALENDAR_SCOPES.join(" "))
            .append_pair("state", state)
            .append_pair("response_type", "code")
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("redirect_uri", self.redirect_uri.as_str());
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair, CalendarError> {
        debug!(redirect_uri = %self.redirect_uri, "Exchanging authorization code");
        let tokens = self
            .token_request(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        info!(
            has_refresh_token = tokens.refresh_token.is_some(),
            "Token exchange successful"
        );
        Ok(tokens)
    }

    async fn refresh(&self, tokens: &TokenPair) -> Result<TokenPair, CalendarError> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| CalendarError::Token("No refresh token in token data".to_string()))?;

        let fresh = self
            .token_request(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        debug!("Access token refreshed");
        Ok(merge_refreshed(tokens, fresh))
    }
}

/// Build a token pair from a token endpoint response, turning the relative
/// `expires_in` into an absolute `expiry_date`.
fn token_pair_from_response(
    body: serde_json::Value,
    now_ms: i64,
) -> Result<TokenPair, CalendarError> {
    let mut tokens: TokenPair = serde_json::from_value(body)
        .map_err(|e| CalendarError::Token(format!("Token response missing fields: {e}")))?;
    let expires_in = tokens
        .extra
        .remove("expires_in")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    tokens.expiry_date = Some(now_ms + expires_in * 1000);
    Ok(tokens)
}

/// A refresh response usually omits the refresh token; keep the old one.
fn merge_refreshed(old: &TokenPair, fresh: TokenPair) -> TokenPair {
    TokenPair {
        refresh_token: fresh.refresh_token.or_else(|| old.refresh_token.clone()),
        scope: fresh.scope.or_else(|| old.scope.clone()),
        token_type: fresh.token_type.or_else(|| old.token_type.clone()),
        id_token: fresh.id_token.or_else(|| old.id_token.clone()),
        ..fresh
    }
}
