//! Router test harness: an [`AppState`] wired to in-process stubs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::net::TcpListener;

use crate::auth::{Authenticator, StaticVerifier};
use crate::calendar::CalendarService;
use crate::calendar::testing::{StubCalendar, StubOAuth};
use crate::config::AppConfig;
use crate::conversations::MemoryConversationStore;
use crate::llm::testing::StubLlm;
use crate::messaging::testing::StubSender;
use crate::messaging::{AudioStore, WhatsAppChannel};
use crate::server::{AppState, build_router};
use crate::speech::CachedSpeech;
use crate::speech::testing::StubSpeech;
use crate::tokens::{TokenCookies, TokenPair};

/// Recipient used by [`TestApp::with_sender`].
pub const TEST_WHATSAPP_TO: &str = "+33612345678";

/// Parse a JSON response body.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub struct TestApp {
    pub state: AppState,
    pub key: Key,
    pub llm: Arc<StubLlm>,
    pub calendar: Arc<StubCalendar>,
    _audio_dir: Arc<TempDir>,
}

impl TestApp {
    /// No Google, no Twilio.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Google configured, backed by the given stubs.
    pub fn with_calendar(oauth: StubOAuth, calendar: StubCalendar) -> Self {
        Self::build(Some((oauth, calendar)))
    }

    fn build(google: Option<(StubOAuth, StubCalendar)>) -> Self {
        let audio_dir = Arc::new(tempfile::tempdir().unwrap());
        let mut vars: HashMap<&str, String> = HashMap::from([
            ("APP_URL", "http://localhost:3000".to_string()),
            ("OPENAI_API_KEY", "sk-test".to_string()),
            ("DEV_SESSION_TOKENS", "tok-alice:user_alice,tok-bob:user_bob".to_string()),
            ("AUDIO_DIR", audio_dir.path().join("audio").display().to_string()),
        ]);
        if google.is_some() {
            vars.insert("GOOGLE_CLIENT_ID", "client".to_string());
            vars.insert("GOOGLE_CLIENT_SECRET", "secret".to_string());
            vars.insert("CALENDAR_ID", "team-calendar".to_string());
        }
        let config = AppConfig::from_vars(|key| vars.get(key).cloned()).unwrap();

        let key = Key::generate();
        let tokens = TokenCookies::default();
        let llm = Arc::new(StubLlm::replying(&["Stay focused."]));
        let (oauth, calendar) = match google {
            Some((oauth, calendar)) => (Some(oauth), Arc::new(calendar)),
            None => (None, Arc::new(StubCalendar::default())),
        };
        let calendar_service = oauth.map(|oauth| {
            Arc::new(CalendarService::new(
                Arc::new(oauth),
                calendar.clone(),
                tokens,
                config
                    .google
                    .as_ref()
                    .map(|g| g.calendar_id.clone())
                    .unwrap_or_default(),
            ))
        });

        let state = AppState {
            auth: Authenticator::new(
                Arc::new(StaticVerifier::new(config.auth.dev_tokens.clone())),
                config.auth.session_cookie.clone(),
            ),
            cookie_key: key.clone(),
            tokens,
            calendar: calendar_service,
            llm: llm.clone(),
            speech: Arc::new(StubSpeech::default()),
            message_speech: Arc::new(CachedSpeech::new(Arc::new(StubSpeech::default()))),
            whatsapp: None,
            audio_store: AudioStore::new(config.audio_dir.clone()),
            conversations: Arc::new(MemoryConversationStore::new()),
            config: Arc::new(config),
        };

        Self {
            state,
            key,
            llm,
            calendar,
            _audio_dir: audio_dir,
        }
    }

    pub fn with_llm(self, llm: StubLlm) -> Self {
        self.with_llm_arc(Arc::new(llm))
    }

    pub fn with_llm_arc(mut self, llm: Arc<StubLlm>) -> Self {
        self.state.llm = llm.clone();
        self.llm = llm;
        self
    }

    /// Set the wa.me share-link number.
    pub fn with_whatsapp_number(mut self, number: &str) -> Self {
        let mut config = (*self.state.config).clone();
        config.whatsapp_number = Some(number.to_string());
        self.state.config = Arc::new(config);
        self
    }

    /// Enable WhatsApp messaging through `sender`, addressed to [`TEST_WHATSAPP_TO`].
    pub fn with_sender(mut self, sender: Arc<StubSender>) -> Self {
        self.state.whatsapp = Some(WhatsAppChannel::new(sender, TEST_WHATSAPP_TO));
        self
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// `Cookie` header value carrying the user's encrypted token pair.
    pub fn token_cookie(&self, user_id: &str, tokens: &TokenPair) -> String {
        let jar = self
            .state
            .tokens
            .store(PrivateCookieJar::new(self.key.clone()), user_id, tokens)
            .unwrap();
        let response = jar.into_response();
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// Decrypt the token pair from a `Set-Cookie` header.
    pub fn stored_tokens(&self, user_id: &str, set_cookie: &str) -> Option<TokenPair> {
        let pair = set_cookie.split(';').next()?;
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(pair).ok()?);
        let jar = PrivateCookieJar::from_headers(&headers, self.key.clone());
        self.state.tokens.get(&jar, user_id)
    }
}

/// One request seen by a [`RecordingServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body decoded as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Local HTTP server on a random port that answers every request with the
/// same canned response and records what it received.
pub struct RecordingServer {
    pub base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl RecordingServer {
    pub async fn start(status: StatusCode, reply: &'static str) -> Self {
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();
        let recorded = requests.clone();
        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                let recorded = recorded.clone();
                async move {
                    let query = uri
                        .query()
                        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
                        .unwrap_or_default();
                    recorded.lock().unwrap().push(RecordedRequest {
                        method,
                        path: uri.path().to_string(),
                        query,
                        headers,
                        body,
                    });
                    (status, [(header::CONTENT_TYPE, "application/json")], reply)
                }
            },
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}
