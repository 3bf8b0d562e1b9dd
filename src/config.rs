//! Configuration types.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file). Provider sections are `None` when their key variable is
//! absent, which disables the matching feature instead of failing startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono_tz::Tz;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Default OAuth callback path, relative to `APP_URL`.
pub const DEFAULT_CALLBACK_PATH: &str = "/api/google-callback";

/// Google OAuth + Calendar settings.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Path of the OAuth callback route, e.g. `/api/google-callback`.
    pub callback_path: String,
    /// Calendar used for availability checks and meeting creation.
    pub calendar_id: String,
}

/// Twilio WhatsApp settings.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender number (the Twilio WhatsApp number).
    pub from_number: String,
    /// Recipient number (the user's own WhatsApp number).
    pub to_number: String,
}

/// Language model settings for chat and motivation.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            system_prompt: None,
        }
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub tts_model: String,
    pub tts_voice: String,
    /// When set, message playback uses Zyphra instead of OpenAI speech.
    pub zyphra_api_key: Option<SecretString>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            zyphra_api_key: None,
        }
    }
}

/// Session / identity provider settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Cookie carrying the identity provider session token.
    pub session_cookie: String,
    /// Identity provider user-info endpoint.
    pub userinfo_url: Option<String>,
    /// Fixed `token -> user` pairs for development.
    pub dev_tokens: Vec<(String, String)>,
    /// Master key for the encrypted token cookies (>= 64 bytes).
    pub cookie_secret: Option<SecretString>,
    /// Mark cookies `Secure`.
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: "__session".to_string(),
            userinfo_url: None,
            dev_tokens: Vec::new(),
            cookie_secret: None,
            secure_cookies: false,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Public base URL, without trailing slash.
    pub app_url: String,
    pub openai_api_key: SecretString,
    pub chat: ChatConfig,
    pub speech: SpeechConfig,
    pub auth: AuthConfig,
    pub google: Option<GoogleConfig>,
    pub twilio: Option<TwilioConfig>,
    /// Target number for the wa.me share link.
    pub whatsapp_number: Option<String>,
    /// Zone for "today" and availability slots.
    pub timezone: Tz,
    /// Zone in which meeting date/time input is interpreted.
    pub meeting_timezone: Tz,
    pub audio_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let app_url = required("APP_URL")?.trim_end_matches('/').to_string();
        let openai_api_key = SecretString::from(required("OPENAI_API_KEY")?);

        let bind_addr = parse_or::<SocketAddr>(get("BIND_ADDR"), "BIND_ADDR", "0.0.0.0:3000".parse().ok())?;

        let chat_defaults = ChatConfig::default();
        let chat = ChatConfig {
            model: get("CHAT_MODEL").unwrap_or(chat_defaults.model),
            temperature: parse_or(get("CHAT_TEMPERATURE"), "CHAT_TEMPERATURE", Some(chat_defaults.temperature))?,
            max_tokens: parse_or(get("CHAT_MAX_TOKENS"), "CHAT_MAX_TOKENS", Some(chat_defaults.max_tokens))?,
            system_prompt: get("CHAT_SYSTEM_PROMPT"),
        };

        let speech_defaults = SpeechConfig::default();
        let speech = SpeechConfig {
            tts_model: get("TTS_MODEL").unwrap_or(speech_defaults.tts_model),
            tts_voice: get("TTS_VOICE").unwrap_or(speech_defaults.tts_voice),
            zyphra_api_key: get("ZYPHRA_API_KEY").map(SecretString::from),
        };

        let auth = AuthConfig {
            session_cookie: get("SESSION_COOKIE").unwrap_or_else(|| "__session".to_string()),
            userinfo_url: get("IDENTITY_USERINFO_URL"),
            dev_tokens: get("DEV_SESSION_TOKENS")
                .map(|s| parse_token_pairs(&s))
                .transpose()?
                .unwrap_or_default(),
            cookie_secret: get("COOKIE_SECRET").map(SecretString::from),
            secure_cookies: get("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production")),
        };

        let google = match get("GOOGLE_CLIENT_ID") {
            Some(client_id) => Some(GoogleConfig {
                client_id,
                client_secret: SecretString::from(required("GOOGLE_CLIENT_SECRET")?),
                callback_path: normalize_path(
                    &get("GOOGLE_CALLBACK_URL").unwrap_or_else(|| DEFAULT_CALLBACK_PATH.to_string()),
                ),
                calendar_id: get("CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
            }),
            None => None,
        };

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_WHATSAPP_NUMBER"),
            get("MY_WHATSAPP_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number), Some(to_number)) => Some(TwilioConfig {
                account_sid,
                auth_token: SecretString::from(auth_token),
                from_number,
                to_number,
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr,
            app_url,
            openai_api_key,
            chat,
            speech,
            auth,
            google,
            twilio,
            whatsapp_number: get("WHATSAPP_NUMBER"),
            timezone: parse_or(get("TIMEZONE"), "TIMEZONE", Some(Tz::UTC))?,
            meeting_timezone: parse_or(get("MEETING_TIMEZONE"), "MEETING_TIMEZONE", Some(Tz::Europe__Paris))?,
            audio_dir: get("AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public/audio")),
            static_dir: get("STATIC_DIR").map(PathBuf::from),
            database_path: get("DATABASE_PATH").map(PathBuf::from),
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    /// Absolute OAuth redirect URI registered with Google.
    pub fn redirect_uri(&self) -> Option<String> {
        self.google
            .as_ref()
            .map(|g| format!("{}{}", self.app_url, g.callback_path))
    }

    /// Absolute URL for a path on this service.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.app_url, normalize_path(path))
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => default.ok_or_else(|| ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn parse_token_pairs(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                Ok((token.to_string(), user.to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                key: "DEV_SESSION_TOKENS".to_string(),
                message: format!("expected token:user, got '{pair}'"),
            }),
        })
        .collect()
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
