//! Error types for Daybreak.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Identity provider / session errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Identity provider request failed: {0}")]
    Request(String),

    #[error("Identity provider returned HTTP {status}")]
    Provider { status: u16 },

    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),
}

/// Calendar provider errors (OAuth and event API).
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar is not connected")]
    NotConnected,

    #[error("Token request failed: {0}")]
    Token(String),

    #[error("Calendar API returned HTTP {status}: {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    #[error("Calendar request failed: {0}")]
    Request(String),

    #[error("Invalid calendar response: {0}")]
    InvalidResponse(String),

    #[error("Invalid date or time: {0}")]
    InvalidDate(String),
}

impl CalendarError {
    /// Whether the provider rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CalendarError::Api { status: 401, .. })
    }

    /// Whether the provider reports the Calendar API as disabled for the project.
    pub fn is_api_disabled(&self) -> bool {
        matches!(
            self,
            CalendarError::Api { status: 403, reason: Some(reason), .. }
                if reason == "accessNotConfigured"
        )
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Speech synthesis errors.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Text is required and cannot be empty")]
    EmptyText,

    #[error("Speech provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },
}

/// Messaging provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Failed to send message via {provider}: {reason}")]
    SendFailed { provider: String, reason: String },

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Conversation storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// HTTP-facing error: a status code and a public message.
///
/// Rendered as `{"error": "<message>"}`. The underlying cause is logged by the
/// handler before the error is built; it is never sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Unwrap a JSON body, answering with the route's own 500 when it does not
/// decode.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>, message: &str) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected request body");
        ApiError::internal(message)
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
