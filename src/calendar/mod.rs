//! Google Calendar access for signed-in users.
//!
//! Tokens live in the user's encrypted cookie (see [`crate::tokens`]). Every
//! calendar request goes through [`CalendarService::connect`], which loads the
//! token pair, refreshes it when it is about to expire, and hands back an
//! access token plus any refreshed pair the handler must write back.

pub mod client;
pub mod model;
pub mod oauth;
pub mod routes;
pub mod slots;

use std::sync::Arc;

use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::Utc;
use tracing::{debug, warn};

pub use client::{CalendarApi, GoogleCalendar};
pub use model::{CalendarEvent, EventQuery, EventTime, NewEvent};
pub use oauth::{GoogleOAuth, OAuthClient};

use crate::error::CalendarError;
use crate::tokens::{TokenCookies, TokenPair};

/// Refresh access tokens this close to expiry.
const REFRESH_LEEWAY_SECS: i64 = 60;

/// An authorized calendar session for one request.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    /// Set when the token pair was refreshed and must be persisted.
    pub refreshed: Option<TokenPair>,
}

/// OAuth client, events API and token storage, bundled for the handlers.
pub struct CalendarService {
    oauth: Arc<dyn OAuthClient>,
    api: Arc<dyn CalendarApi>,
    cookies: TokenCookies,
    calendar_id: String,
}

impl CalendarService {
    pub fn new(
        oauth: Arc<dyn OAuthClient>,
        api: Arc<dyn CalendarApi>,
        cookies: TokenCookies,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            oauth,
            api,
            cookies,
            calendar_id: calendar_id.into(),
        }
    }

    pub fn oauth(&self) -> &dyn OAuthClient {
        self.oauth.as_ref()
    }

    pub fn api(&self) -> &dyn CalendarApi {
        self.api.as_ref()
    }

    pub fn cookies(&self) -> TokenCookies {
        self.cookies
    }

    /// Calendar used for availability and meeting creation.
    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    /// Whether the user has stored tokens at all.
    pub fn is_connected(&self, jar: &PrivateCookieJar, user_id: &str) -> bool {
        self.cookies.get(jar, user_id).is_some()
    }

    /// Load the user's tokens, refreshing them when they are about to expire.
    pub async fn connect(&self, jar: &PrivateCookieJar, user_id: &str) -> Result<Session, CalendarError> {
        let tokens = self.cookies.get(jar, user_id).ok_or(CalendarError::NotConnected)?;
        if tokens.refresh_token.is_none() {
            debug!(user_id, "Stored tokens have no refresh token");
            return Err(CalendarError::NotConnected);
        }

        if !tokens.expires_within(Utc::now().timestamp_millis(), REFRESH_LEEWAY_SECS) {
            return Ok(Session {
                access_token: tokens.access_token,
                refreshed: None,
            });
        }

        debug!(user_id, "Access token expiring, refreshing");
        let fresh = self.oauth.refresh(&tokens).await.map_err(|e| {
            warn!(user_id, error = %e, "Token refresh failed");
            e
        })?;
        Ok(Session {
            access_token: fresh.access_token.clone(),
            refreshed: Some(fresh),
        })
    }

    /// Write back a refreshed token pair, if the session produced one.
    pub fn persist(&self, jar: PrivateCookieJar, user_id: &str, session: &Session) -> PrivateCookieJar {
        let Some(tokens) = &session.refreshed else {
            return jar;
        };
        match self.cookies.store(jar.clone(), user_id, tokens) {
            Ok(jar) => jar,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to store refreshed tokens");
                jar
            }
        }
    }
}
