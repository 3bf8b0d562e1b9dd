//! Daily motivation: a short generated pep talk plus today's agenda, as text
//! and audio, shareable to WhatsApp.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::cookie::PrivateCookieJar;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::CurrentUser;
use crate::calendar::slots::today_bounds;
use crate::calendar::{CalendarEvent, EventQuery};
use crate::error::{ApiError, CalendarError, json_body};
use crate::llm::{ChatMessage, CompletionRequest};
use crate::messaging::whatsapp_link;
use crate::server::AppState;

pub const COACH_PROMPT: &str = "You are a motivational coach. Create a short, powerful motivational message (max 100 words) that inspires action and positive thinking.";

pub const VOICE_CAPTION: &str = "🎤 Your motivational message (voice)";

const AGENDA_CALENDAR: &str = "primary";

const SEND_FAILED: &str = "Failed to send WhatsApp message";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/motivation/generate", post(generate))
        .route("/api/motivation/send", post(send))
}

/// Agenda suffix appended to the motivational text.
pub fn format_events_text(events: &[CalendarEvent], tz: Tz) -> String {
    if events.is_empty() {
        return "\n\nNo events scheduled for today.".to_string();
    }
    let lines: Vec<String> = events
        .iter()
        .map(|event| {
            let time = event
                .start
                .as_ref()
                .and_then(|start| start.start_in(tz))
                .map(|start| start.format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string());
            let summary = event.summary.as_deref().unwrap_or("(no title)");
            format!("• {time} - {summary}")
        })
        .collect();
    format!("\n\nToday's Events:\n{}", lines.join("\n"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Motivation {
    pub text: String,
    /// Base64 MP3.
    pub audio: String,
    pub whatsapp_link: Option<String>,
}

/// Today's events when the calendar is connected; empty otherwise.
async fn todays_events(
    state: &AppState,
    jar: PrivateCookieJar,
    user_id: &str,
) -> Result<(PrivateCookieJar, Vec<CalendarEvent>), CalendarError> {
    let Some(svc) = state.calendar.as_ref() else {
        return Ok((jar, Vec::new()));
    };
    let session = match svc.connect(&jar, user_id).await {
        Ok(session) => session,
        Err(CalendarError::NotConnected) => return Ok((jar, Vec::new())),
        Err(e) => {
            warn!(user_id, error = %e, "Calendar unavailable, generating without events");
            return Ok((jar, Vec::new()));
        }
    };

    let (start, end) = today_bounds(Utc::now(), state.config.timezone)?;
    let query = EventQuery::between(start.to_rfc3339(), end.to_rfc3339());
    let events = svc
        .api()
        .list_events(&session.access_token, AGENDA_CALENDAR, &query)
        .await?;
    Ok((svc.persist(jar, user_id, &session), events))
}

async fn generate(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Json<Motivation>), ApiError> {
    let failed = || ApiError::internal("Failed to generate motivation");

    let (jar, events) = todays_events(&state, jar, &user_id).await.map_err(|e| {
        error!(user_id = %user_id, error = %e, "Failed to load today's events");
        failed()
    })?;

    let chat = &state.config.chat;
    let request = CompletionRequest::new(vec![ChatMessage::system(COACH_PROMPT)])
        .with_model(chat.model.as_str())
        .with_temperature(chat.temperature)
        .with_max_tokens(chat.max_tokens);
    let completion = state.llm.complete(request).await.map_err(|e| {
        error!(user_id = %user_id, error = %e, "Motivation completion failed");
        failed()
    })?;
    let message = completion.content.trim().to_string();

    let audio = state.speech.synthesize(&message).await.map_err(|e| {
        error!(user_id = %user_id, error = %e, "Motivation speech failed");
        failed()
    })?;

    let text = format!("{message}{}", format_events_text(&events, state.config.timezone));
    let whatsapp_link = state
        .config
        .whatsapp_number
        .as_deref()
        .map(|number| whatsapp_link(number, &text));

    info!(user_id = %user_id, events = events.len(), "Motivation generated");
    Ok((
        jar,
        Json(Motivation {
            text,
            audio: STANDARD.encode(&audio),
            whatsapp_link,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub text: String,
    #[serde(default)]
    pub audio: Option<String>,
}

async fn send(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = json_body(body, SEND_FAILED)?;
    let Some(channel) = state.whatsapp.as_ref() else {
        warn!("WhatsApp messaging is not configured");
        return Ok(Json(json!({
            "success": false,
            "warning": "WhatsApp messaging is not configured",
        })));
    };

    channel.send(&body.text, None).await.map_err(|e| {
        error!(user_id = %user_id, error = %e, "Failed to send WhatsApp message");
        ApiError::internal(SEND_FAILED)
    })?;

    if let Some(audio) = body.audio.as_deref().filter(|a| !a.is_empty()) {
        let sent = async {
            let path = state.audio_store.save(audio, &user_id).await?;
            let url = state.config.absolute_url(&path);
            channel.send(VOICE_CAPTION, Some(&url)).await
        };
        if let Err(e) = sent.await {
            error!(user_id = %user_id, error = %e, "Failed to send audio");
        }
    }

    Ok(Json(json!({ "success": true })))
}
