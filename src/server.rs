//! Application state and the HTTP router.

use std::sync::Arc;

use axum::extract::{FromRef, Query};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::Key;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{Authenticator, SessionVerifier, StaticVerifier, UserInfoVerifier};
use crate::calendar::{CalendarService, GoogleCalendar, GoogleOAuth};
use crate::config::{AppConfig, DEFAULT_CALLBACK_PATH};
use crate::conversations::{ConversationStore, open_store};
use crate::error::Error;
use crate::llm::{LlmProvider, create_provider};
use crate::messaging::audio::AUDIO_URL_PREFIX;
use crate::messaging::{AudioStore, TwilioWhatsApp, WhatsAppChannel};
use crate::speech::{CachedSpeech, OpenAiSpeech, SpeechSynthesizer, message_synthesizer};
use crate::tokens::TokenCookies;

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Authenticator,
    pub cookie_key: Key,
    pub tokens: TokenCookies,
    /// `None` when Google OAuth is not configured.
    pub calendar: Option<Arc<CalendarService>>,
    pub llm: Arc<dyn LlmProvider>,
    /// Motivation audio.
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// Chat message playback.
    pub message_speech: Arc<CachedSpeech>,
    /// `None` when Twilio is not configured.
    pub whatsapp: Option<WhatsAppChannel>,
    pub audio_store: AudioStore,
    pub conversations: Arc<dyn ConversationStore>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    /// Build the production providers from configuration.
    pub async fn from_config(config: AppConfig, cookie_key: Key) -> Result<Self, Error> {
        let verifier: Arc<dyn SessionVerifier> = match &config.auth.userinfo_url {
            Some(url) => {
                info!(url = %url, "Verifying sessions against identity provider");
                Arc::new(UserInfoVerifier::new(url.clone()))
            }
            None => {
                info!(tokens = config.auth.dev_tokens.len(), "Using static development sessions");
                Arc::new(StaticVerifier::new(config.auth.dev_tokens.clone()))
            }
        };
        let auth = Authenticator::new(verifier, config.auth.session_cookie.clone());
        let tokens = TokenCookies::new(config.auth.secure_cookies);

        let calendar = match (&config.google, config.redirect_uri()) {
            (Some(google), Some(redirect_uri)) => {
                info!(redirect_uri = %redirect_uri, calendar_id = %google.calendar_id, "Google Calendar enabled");
                let oauth = GoogleOAuth::new(google.client_id.clone(), google.client_secret.clone(), redirect_uri);
                Some(Arc::new(CalendarService::new(
                    Arc::new(oauth),
                    Arc::new(GoogleCalendar::new()),
                    tokens,
                    google.calendar_id.clone(),
                )))
            }
            _ => {
                info!("Google Calendar not configured");
                None
            }
        };

        let llm = create_provider(&config.openai_api_key, &config.chat.model)?;
        let speech: Arc<dyn SpeechSynthesizer> = Arc::new(OpenAiSpeech::new(
            config.openai_api_key.clone(),
            config.speech.tts_model.clone(),
            config.speech.tts_voice.clone(),
        ));
        let message_speech = Arc::new(CachedSpeech::new(message_synthesizer(
            &config.speech,
            &config.openai_api_key,
        )));

        let whatsapp = config.twilio.as_ref().map(|twilio| {
            info!(to = %twilio.to_number, "WhatsApp messaging enabled");
            WhatsAppChannel::new(Arc::new(TwilioWhatsApp::new(twilio)), twilio.to_number.clone())
        });

        let conversations = open_store(config.database_path.as_deref()).await?;
        let audio_store = AudioStore::new(config.audio_dir.clone());

        Ok(Self {
            config: Arc::new(config),
            auth,
            cookie_key,
            tokens,
            calendar,
            llm,
            speech,
            message_speech,
            whatsapp,
            audio_store,
            conversations,
        })
    }
}

/// Assemble all routes, static files and middleware.
pub fn build_router(state: AppState) -> Router {
    let callback_path = state
        .config
        .google
        .as_ref()
        .map(|g| g.callback_path.clone())
        .unwrap_or_else(|| DEFAULT_CALLBACK_PATH.to_string());
    let audio_dir = state.audio_store.dir().to_path_buf();
    let static_dir = state.config.static_dir.clone();

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/error", get(error_page))
        .merge(crate::calendar::routes::routes(&callback_path))
        .merge(crate::chat::routes())
        .merge(crate::conversations::routes::routes())
        .merge(crate::speech::routes::routes())
        .merge(crate::motivation::routes())
        .nest_service(AUDIO_URL_PREFIX, ServeDir::new(audio_dir));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "daybreak"
    }))
}

// ── OAuth error page ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorQuery {
    reason: Option<String>,
}

const DEFAULT_ERROR_MESSAGE: &str = "There was an error connecting to Google Calendar";

/// Human-readable message for an OAuth callback failure code.
fn reason_message(reason: &str) -> Option<&'static str> {
    match reason {
        "oauth_error" => Some("Google OAuth error occurred"),
        "auth_mismatch" => Some("Authentication state mismatch"),
        "no_code" => Some("No authorization code received"),
        "token_exchange" => Some("Failed to exchange authorization code for tokens"),
        _ => None,
    }
}

async fn error_page(Query(query): Query<ErrorQuery>) -> Html<String> {
    let reason = query.reason.as_deref().filter(|r| !r.is_empty());
    // Only known codes are echoed back.
    let known = reason.and_then(|r| reason_message(r).map(|m| (r, m)));
    let message = known.map(|(_, m)| m).unwrap_or(DEFAULT_ERROR_MESSAGE);
    let code = known
        .map(|(r, _)| format!("\n  <p class=\"code\">Error code: {r}</p>"))
        .unwrap_or_default();

    Html(format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>Authentication Error</title></head>\n<body>\n  \
         <h1>Authentication Error</h1>\n  <p>{message}. Please try again.</p>{code}\n  \
         <a href=\"/configuration\">Return to Settings</a>\n</body>\n</html>\n"
    ))
}
