//! Calendar HTTP handlers: OAuth connect flow, status, events, availability
//! and meeting creation.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::Duration;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::model::{EventQuery, NewEvent};
use super::{CalendarService, Session, slots};
use crate::auth::{CurrentUser, MaybeUser};
use crate::config::DEFAULT_CALLBACK_PATH;
use crate::error::{ApiError, CalendarError, json_body};
use crate::server::AppState;

/// Calendar for the events view.
const EVENTS_CALENDAR: &str = "primary";
const EVENTS_MAX_RESULTS: u32 = 100;

const NOT_CONNECTED: &str =
    "Calendar not connected or needs reauthorization. Please reconnect your calendar.";
const AUTH_EXPIRED: &str = "Calendar authentication expired. Please reconnect.";

pub fn routes(callback_path: &str) -> Router<AppState> {
    let mut callback_paths = vec!["/api/callback", DEFAULT_CALLBACK_PATH];
    if !callback_paths.contains(&callback_path) {
        callback_paths.push(callback_path);
    }

    let router = callback_paths
        .into_iter()
        .fold(Router::new(), |router, path| router.route(path, get(oauth_callback)));

    router
        .route("/api/callback/disconnect", post(disconnect))
        .route("/api/calendar/auth-url", get(auth_url))
        .route("/api/calendar/status", get(status))
        .route("/api/calendar/events", get(list_events))
        .route("/api/calendar/availability", get(availability))
        .route("/api/calendar/create", post(create_meeting))
}

fn service(state: &AppState) -> Option<&Arc<CalendarService>> {
    state.calendar.as_ref()
}

// ── OAuth ───────────────────────────────────────────────────────────

async fn auth_url(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let svc = service(&state).ok_or_else(|| {
        error!("Failed to generate auth URL: Google OAuth is not configured");
        ApiError::internal("Failed to generate auth URL")
    })?;
    let url = svc.oauth().authorize_url(&user_id).map_err(|e| {
        error!(error = %e, "Failed to generate auth URL");
        ApiError::internal("Failed to generate auth URL")
    })?;
    Ok(Json(json!({ "url": url })))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn oauth_callback(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let error_redirect = |reason: &str| {
        Redirect::to(&state.config.absolute_url(&format!("/error?reason={reason}"))).into_response()
    };

    info!(
        has_code = params.code.is_some(),
        has_state = params.state.is_some(),
        error = params.error.as_deref().unwrap_or("none"),
        "OAuth callback"
    );

    if let Some(err) = &params.error {
        error!(error = %err, "OAuth error from provider");
        return error_redirect("oauth_error");
    }

    let user_id = match user {
        Some(user_id) if params.state.as_deref() == Some(user_id.as_str()) => user_id,
        user_id => {
            error!(user_id = ?user_id, state = ?params.state, "OAuth state does not match session");
            return error_redirect("auth_mismatch");
        }
    };

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        error!("No authorization code received");
        return error_redirect("no_code");
    };

    let Some(svc) = service(&state) else {
        error!("OAuth callback received but Google OAuth is not configured");
        return error_redirect("token_exchange");
    };

    let tokens = match svc.oauth().exchange_code(code).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(error = %e, "Token exchange failed");
            return error_redirect("token_exchange");
        }
    };

    match svc.cookies().store(jar, &user_id, &tokens) {
        Ok(jar) => {
            info!(user_id = %user_id, "Calendar connected");
            (jar, Redirect::to(&state.config.absolute_url("/configuration"))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to store tokens");
            error_redirect("token_exchange")
        }
    }
}

async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Json<serde_json::Value>) {
    let jar = state.tokens.remove(jar, &user_id);
    info!(user_id = %user_id, "Calendar disconnected");
    (jar, Json(json!({ "success": true })))
}

async fn status(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    jar: PrivateCookieJar,
) -> Json<serde_json::Value> {
    let connected = match (user, service(&state)) {
        (Some(user_id), Some(svc)) => svc.is_connected(&jar, &user_id),
        _ => false,
    };
    Json(json!({ "connected": connected }))
}

// ── Events ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventsParams {
    start: Option<String>,
    end: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    jar: PrivateCookieJar,
    Query(params): Query<EventsParams>,
) -> Result<(PrivateCookieJar, Json<serde_json::Value>), ApiError> {
    let not_connected = || ApiError::new(StatusCode::UNAUTHORIZED, NOT_CONNECTED);
    let svc = service(&state).ok_or_else(not_connected)?;
    let session = match svc.connect(&jar, &user_id).await {
        Ok(session) => session,
        Err(CalendarError::NotConnected) => return Err(not_connected()),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Calendar session could not be refreshed");
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, AUTH_EXPIRED));
        }
    };

    let (Some(start), Some(end)) = (
        params.start.filter(|s| !s.is_empty()),
        params.end.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Start and end dates are required"));
    };

    let query = EventQuery::between(start, end).with_max_results(EVENTS_MAX_RESULTS);
    let events = svc
        .api()
        .list_events(&session.access_token, EVENTS_CALENDAR, &query)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Calendar API error");
            if e.is_unauthorized() {
                ApiError::new(StatusCode::UNAUTHORIZED, AUTH_EXPIRED)
            } else if e.is_api_disabled() {
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Google Calendar API is not enabled for this project",
                )
            } else {
                ApiError::internal("Failed to fetch calendar events")
            }
        })?;

    let jar = svc.persist(jar, &user_id, &session);
    Ok((jar, Json(json!({ "events": events, "success": true }))))
}

// ── Scheduling ──────────────────────────────────────────────────────

/// Session for the scheduling routes, which report any failure the same way.
async fn scheduling_session<'a>(
    state: &'a AppState,
    jar: &PrivateCookieJar,
    user_id: &str,
) -> Result<(&'a Arc<CalendarService>, Session), ApiError> {
    let init_failed = || ApiError::internal("Failed to initialize calendar");
    let svc = service(state).ok_or_else(init_failed)?;
    let session = svc.connect(jar, user_id).await.map_err(|e| {
        error!(user_id, error = %e, "Failed to initialize calendar");
        init_failed()
    })?;
    Ok((svc, session))
}

#[derive(Debug, Deserialize)]
struct AvailabilityParams {
    date: Option<String>,
}

async fn availability(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    jar: PrivateCookieJar,
    Query(params): Query<AvailabilityParams>,
) -> Result<(PrivateCookieJar, Json<serde_json::Value>), ApiError> {
    let Some(raw_date) = params.date.filter(|d| !d.is_empty()) else {
        return Err(ApiError::bad_request("Date is required"));
    };

    let (svc, session) = scheduling_session(&state, &jar, &user_id).await?;

    let tz = state.config.timezone;
    let date = slots::parse_compact_date(&raw_date).map_err(|e| {
        warn!(error = %e, "Unparseable availability date");
        ApiError::bad_request("Date is required")
    })?;
    let (day_start, day_end) = slots::day_bounds(date, tz).map_err(|e| {
        warn!(error = %e, "Unusable availability date");
        ApiError::bad_request("Date is required")
    })?;

    let query = EventQuery::between(day_start.to_rfc3339(), day_end.to_rfc3339());
    let events = svc
        .api()
        .list_events(&session.access_token, svc.calendar_id(), &query)
        .await
        .map_err(|e| {
            error!(error = %e, "Error checking availability");
            ApiError::internal("Failed to check availability")
        })?;

    let free = slots::free_slots(date, tz, &events);
    let jar = svc.persist(jar, &user_id, &session);
    Ok((jar, Json(json!({ "slots": free }))))
}

#[derive(Debug, Deserialize)]
struct CreateMeetingRequest {
    date: String,
    time: String,
    email: String,
    #[serde(default)]
    description: Option<String>,
}

async fn create_meeting(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    jar: PrivateCookieJar,
    body: Result<Json<CreateMeetingRequest>, JsonRejection>,
) -> Result<(PrivateCookieJar, Json<serde_json::Value>), ApiError> {
    let body = json_body(body, "Failed to create meeting")?;
    let (svc, session) = scheduling_session(&state, &jar, &user_id).await?;

    let start = slots::meeting_start(&body.date, &body.time, state.config.meeting_timezone)
        .map_err(|e| {
            warn!(error = %e, "Invalid meeting date or time");
            ApiError::bad_request("Invalid date or time, expected dd/MM/yyyy and HH:mm")
        })?;
    let end = start + Duration::minutes(slots::MEETING_MINUTES);

    let event = NewEvent::meeting(&body.email, body.description, start, end, conference_request_id());
    let created = svc
        .api()
        .insert_event(&session.access_token, svc.calendar_id(), &event)
        .await
        .map_err(|e| {
            error!(error = %e, "Error creating meeting");
            ApiError::internal("Failed to create meeting")
        })?;

    info!(meeting_id = ?created.id, start = %start, "Meeting created");
    let jar = svc.persist(jar, &user_id, &session);
    Ok((jar, Json(json!({ "success": true, "meetingId": created.id }))))
}

fn conference_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
