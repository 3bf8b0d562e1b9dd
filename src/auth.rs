//! Identity provider session checks.
//!
//! The identity provider owns sign-in; this module only answers "which user
//! does this request belong to?". A session token is taken from the
//! `Authorization: Bearer` header or, failing that, the session cookie, and
//! handed to a [`SessionVerifier`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use crate::error::{ApiError, AuthError};

/// Resolves a session token to a user id.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// `Ok(None)` means the token is not (or no longer) a valid session.
    async fn verify(&self, token: &str) -> Result<Option<String>, AuthError>;
}

/// Fixed token table, for development and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticVerifier {
    tokens: HashMap<String, String>,
}

impl StaticVerifier {
    pub fn new<I, T, U>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, U)>,
        T: Into<String>,
        U: Into<String>,
    {
        Self {
            tokens: pairs
                .into_iter()
                .map(|(t, u)| (t.into(), u.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl SessionVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Option<String>, AuthError> {
        Ok(self.tokens.get(token).cloned())
    }
}

/// Verifies sessions against the identity provider's user-info endpoint.
pub struct UserInfoVerifier {
    client: reqwest::Client,
    url: String,
}

impl UserInfoVerifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SessionVerifier for UserInfoVerifier {
    async fn verify(&self, token: &str) -> Result<Option<String>, AuthError> {
        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::Provider {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok(user_id_from_userinfo(&body))
    }
}

/// Pull the user id out of a user-info document (`sub`, else `id`).
fn user_id_from_userinfo(body: &serde_json::Value) -> Option<String> {
    ["sub", "id"]
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Session lookup shared by the request extractors.
#[derive(Clone)]
pub struct Authenticator {
    verifier: Arc<dyn SessionVerifier>,
    session_cookie: String,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn SessionVerifier>, session_cookie: impl Into<String>) -> Self {
        Self {
            verifier,
            session_cookie: session_cookie.into(),
        }
    }

    /// Extract the raw session token from a request.
    pub fn session_token(&self, headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if bearer.is_some() {
            return bearer;
        }

        CookieJar::from_headers(headers)
            .get(&self.session_cookie)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Resolve the signed-in user. Verifier failures count as "no user".
    pub async fn current_user(&self, headers: &HeaderMap) -> Option<String> {
        let token = self.session_token(headers)?;
        match self.verifier.verify(&token).await {
            Ok(user) => {
                if user.is_none() {
                    debug!("Session token rejected by identity provider");
                }
                user
            }
            Err(e) => {
                warn!(error = %e, "Session verification failed");
                None
            }
        }
    }
}

/// The signed-in user. Rejects with 401 when there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl<S> FromRequestParts<S> for CurrentUser
where
    Authenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Authenticator::from_ref(state);
        auth.current_user(&parts.headers)
            .await
            .map(CurrentUser)
            .ok_or_else(ApiError::unauthorized)
    }
}

/// The signed-in user, if any. Never rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeUser(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeUser
where
    Authenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Authenticator::from_ref(state);
        Ok(MaybeUser(auth.current_user(&parts.headers).await))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use super::*;
    use crate::testing::RecordingServer;

    struct FailingVerifier;

    #[async_trait]
    impl SessionVerifier for FailingVerifier {
        async fn verify(&self, _token: &str) -> Result<Option<String>, AuthError> {
            Err(AuthError::Provider { status: 502 })
        }
    }

    fn authenticator() -> Authenticator {
        Authenticator::new(
            Arc::new(StaticVerifier::new([("tok-alice", "user_alice")])),
            "__session",
        )
    }

    #[tokio::test]
    async fn bearer_header_resolves_user() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok-alice"));
        assert_eq!(
            authenticator().current_user(&headers).await.as_deref(),
            Some("user_alice")
        );
    }

    #[tokio::test]
    async fn session_cookie_resolves_user() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; __session=tok-alice"),
        );
        assert_eq!(
            authenticator().current_user(&headers).await.as_deref(),
            Some("user_alice")
        );
    }

    #[tokio::test]
    async fn unknown_or_missing_token_is_no_user() {
        let auth = authenticator();
        assert!(auth.current_user(&HeaderMap::new()).await.is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(auth.current_user(&headers).await.is_none());
    }

    #[tokio::test]
    async fn verifier_failure_is_no_user() {
        let auth = Authenticator::new(Arc::new(FailingVerifier), "__session");
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert!(auth.current_user(&headers).await.is_none());
    }

    #[test]
    fn userinfo_prefers_sub() {
        let body = serde_json::json!({"sub": "user_1", "id": "other"});
        assert_eq!(user_id_from_userinfo(&body).as_deref(), Some("user_1"));

        let body = serde_json::json!({"id": "user_2"});
        assert_eq!(user_id_from_userinfo(&body).as_deref(), Some("user_2"));

        let body = serde_json::json!({"sub": ""});
        assert!(user_id_from_userinfo(&body).is_none());
    }

    #[tokio::test]
    async fn userinfo_sends_bearer_and_reads_sub() {
        let server = RecordingServer::start(StatusCode::OK, r#"{"sub":"user_alice","email":"a@example.com"}"#).await;
        let verifier = UserInfoVerifier::new(server.url("/userinfo"));

        assert_eq!(verifier.verify("sess-1").await.unwrap().as_deref(), Some("user_alice"));
        let request = &server.requests()[0];
        assert_eq!(request.path, "/userinfo");
        assert_eq!(request.header("authorization"), Some("Bearer sess-1"));
    }

    #[tokio::test]
    async fn userinfo_rejection_is_no_user() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let server = RecordingServer::start(status, r#"{"error":"invalid_token"}"#).await;
            let verifier = UserInfoVerifier::new(server.url("/userinfo"));
            assert_eq!(verifier.verify("expired").await.unwrap(), None, "{status}");
        }
    }

    #[tokio::test]
    async fn userinfo_outage_is_an_error() {
        let server = RecordingServer::start(StatusCode::BAD_GATEWAY, "{}").await;
        let verifier = UserInfoVerifier::new(server.url("/userinfo"));
        assert!(matches!(
            verifier.verify("sess-1").await,
            Err(AuthError::Provider { status: 502 })
        ));
    }
}
