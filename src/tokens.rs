//! Calendar OAuth token storage in encrypted, HTTP-only cookies.
//!
//! One cookie per user: `calendar_token.<user_id>`, holding the provider's
//! token pair as JSON. The cookie jar encrypts and authenticates the value, so
//! the browser only ever sees ciphertext.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cookie name prefix; the user id follows.
pub const TOKEN_COOKIE_PREFIX: &str = "calendar_token.";

/// Lifetime of the token cookie.
pub const TOKEN_COOKIE_MAX_AGE: time::Duration = time::Duration::weeks(1);

/// OAuth credentials as returned by the calendar provider.
///
/// Unknown fields are kept in `extra` so a stored pair reads back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Access token expiry, milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenPair {
    /// Whether the access token expires within `leeway_secs` of `now_ms`.
    pub fn expires_within(&self, now_ms: i64, leeway_secs: i64) -> bool {
        self.expiry_date
            .is_some_and(|expiry| expiry <= now_ms + leeway_secs * 1000)
    }
}

/// Reads and writes token cookies on a [`PrivateCookieJar`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCookies {
    secure: bool,
}

impl TokenCookies {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    pub fn cookie_name(user_id: &str) -> String {
        format!("{TOKEN_COOKIE_PREFIX}{user_id}")
    }

    /// Store the user's token pair, replacing any previous one.
    pub fn store(
        &self,
        jar: PrivateCookieJar,
        user_id: &str,
        tokens: &TokenPair,
    ) -> Result<PrivateCookieJar, serde_json::Error> {
        let value = serde_json::to_string(tokens)?;
        let cookie = Cookie::build((Self::cookie_name(user_id), value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(TOKEN_COOKIE_MAX_AGE);
        debug!(user_id, "Storing calendar tokens");
        Ok(jar.add(cookie))
    }

    /// Read the user's token pair. Missing or unreadable cookies yield `None`.
    pub fn get(&self, jar: &PrivateCookieJar, user_id: &str) -> Option<TokenPair> {
        let cookie = jar.get(&Self::cookie_name(user_id))?;
        match serde_json::from_str(cookie.value()) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to parse stored calendar tokens");
                None
            }
        }
    }

    /// Expire the user's token cookie.
    pub fn remove(&self, jar: PrivateCookieJar, user_id: &str) -> PrivateCookieJar {
        debug!(user_id, "Removing calendar tokens");
        jar.remove(Cookie::build((Self::cookie_name(user_id), "")).path("/"))
    }
}
