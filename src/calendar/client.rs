//! Google Calendar v3 events API.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::model::{CalendarEvent, EventQuery, NewEvent};
use crate::error::CalendarError;

const GOOGLE_CALENDAR_BASE: &str = "https://www.googleapis.com/calendar/v3/";

/// Event operations used by the handlers.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// List single (expanded) events ordered by start time.
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    /// Create an event, including any conference data request.
    async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &NewEvent,
    ) -> Result<CalendarEvent, CalendarError>;
}

/// Google Calendar REST client.
pub struct GoogleCalendar {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendar {
    pub fn new() -> Self {
        Self::with_base_url(GOOGLE_CALENDAR_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CalendarError::Request(format!("Failed to parse URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::Request("Calendar base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["calendars", calendar_id, "events"]);
        Ok(url)
    }
}

impl Default for GoogleCalendar {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendar {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut url = self.events_url(calendar_id)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("timeMin", &query.time_min)
                .append_pair("timeMax", &query.time_max)
                .append_pair("singleEvents", "true")
                .append_pair("orderBy", "startTime");
            if let Some(max) = query.max_results {
                pairs.append_pair("maxResults", &max.to_string());
            }
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| CalendarError::Request(format!("Failed to fetch events: {e}")))?;

        let response = check_status(response).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CalendarError::InvalidResponse(format!("Failed to parse events response: {e}")))?;

        let events = events_from_list(body)?;
        debug!(calendar_id, count = events.len(), "Fetched calendar events");
        Ok(events)
    }

    async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &NewEvent,
    ) -> Result<CalendarEvent, CalendarError> {
        let mut url = self.events_url(calendar_id)?;
        url.query_pairs_mut().append_pair("conferenceDataVersion", "1");

        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| CalendarError::Request(format!("Failed to create event: {e}")))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| CalendarError::InvalidResponse(format!("Failed to parse created event: {e}")))
    }
}

/// Turn a non-success response into `CalendarError::Api`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read error response".to_string());
    Err(api_error(status, &body))
}

/// Parse Google's error envelope: `{"error": {"message", "errors": [{"reason"}]}}`.
fn api_error(status: u16, body: &str) -> CalendarError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(body)
        .to_string();
    let reason = error
        .and_then(|e| e.get("errors"))
        .and_then(|errs| errs.get(0))
        .and_then(|first| first.get("reason"))
        .and_then(|r| r.as_str())
        .map(str::to_string);

    CalendarError::Api {
        status,
        reason,
        message,
    }
}

/// Events from a list response; a missing `items` field means no events.
fn events_from_list(mut body: serde_json::Value) -> Result<Vec<CalendarEvent>, CalendarError> {
    match body.get_mut("items").map(serde_json::Value::take) {
        Some(items) => serde_json::from_value(items)
            .map_err(|e| CalendarError::InvalidResponse(format!("Malformed event list: {e}"))),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::testing::RecordingServer;

    #[test]
    fn events_url_encodes_calendar_id() {
        let calendar = GoogleCalendar::new();
        let url = calendar.events_url("team#holiday@group.v.calendar.google.com").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team%23holiday@group.v.calendar.google.com/events"
        );

        let url = calendar.events_url("primary").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events"
        );
    }

    #[test]
    fn api_error_extracts_reason() {
        let body = r#"{"error":{"code":403,"message":"Google Calendar API has not been used in project 1","errors":[{"reason":"accessNotConfigured","domain":"usageLimits"}]}}"#;
        let err = api_error(403, body);
        assert!(err.is_api_disabled());
        assert!(err.to_string().contains("has not been used"));

        let err = api_error(401, "not json");
        assert!(err.is_unauthorized());
        assert!(matches!(err, CalendarError::Api { reason: None, ref message, .. } if message == "not json"));
    }

    #[test]
    fn list_without_items_is_empty() {
        assert!(events_from_list(serde_json::json!({"kind": "calendar#events"})).unwrap().is_empty());

        let events = events_from_list(serde_json::json!({
            "items": [{"id": "a", "summary": "One"}, {"id": "b"}]
        }))
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].summary.as_deref(), Some("One"));
    }

    #[tokio::test]
    async fn list_expands_recurring_events_in_start_order() {
        let server = RecordingServer::start(
            StatusCode::OK,
            r#"{"kind":"calendar#events","items":[{"id":"e1","summary":"Standup"}]}"#,
        )
        .await;
        let calendar = GoogleCalendar::with_base_url(server.url("/calendar/v3/"));
        let query = EventQuery::between("2024-03-04T00:00:00Z", "2024-03-05T00:00:00Z").with_max_results(100);

        let events = calendar.list_events("access-1", "primary", &query).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary.as_deref(), Some("Standup"));

        let request = &server.requests()[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/calendar/v3/calendars/primary/events");
        assert_eq!(request.header("authorization"), Some("Bearer access-1"));
        assert_eq!(request.query["timeMin"], "2024-03-04T00:00:00Z");
        assert_eq!(request.query["timeMax"], "2024-03-05T00:00:00Z");
        assert_eq!(request.query["singleEvents"], "true");
        assert_eq!(request.query["orderBy"], "startTime");
        assert_eq!(request.query["maxResults"], "100");
    }

    #[tokio::test]
    async fn list_without_limit_omits_max_results() {
        let server = RecordingServer::start(StatusCode::OK, "{}").await;
        let calendar = GoogleCalendar::with_base_url(server.url("/"));
        let events = calendar
            .list_events("a", "team-calendar", &EventQuery::between("s", "e"))
            .await
            .unwrap();
        assert!(events.is_empty());
        assert!(!server.requests()[0].query.contains_key("maxResults"));
    }

    #[tokio::test]
    async fn insert_requests_conference_data() {
        let server = RecordingServer::start(StatusCode::OK, r#"{"id":"evt_created"}"#).await;
        let calendar = GoogleCalendar::with_base_url(server.url("/calendar/v3/"));
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let event = NewEvent::meeting(
            "guest@example.com",
            None,
            start,
            start + chrono::Duration::minutes(20),
            "abcdefghij".to_string(),
        );

        let created = calendar.insert_event("access-1", "team-calendar", &event).await.unwrap();
        assert_eq!(created.id.as_deref(), Some("evt_created"));

        let request = &server.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/calendar/v3/calendars/team-calendar/events");
        assert_eq!(request.query["conferenceDataVersion"], "1");
        let body = request.json();
        assert_eq!(body["summary"], "Meeting with guest@example.com");
        assert_eq!(body["attendees"][0]["email"], "guest@example.com");
        assert!(body.get("conferenceData").is_some());
    }

    #[tokio::test]
    async fn error_responses_become_api_errors() {
        let server = RecordingServer::start(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"code":401,"message":"Invalid Credentials","errors":[{"reason":"authError"}]}}"#,
        )
        .await;
        let calendar = GoogleCalendar::with_base_url(server.url("/"));
        let err = calendar
            .list_events("stale", "primary", &EventQuery::between("s", "e"))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(matches!(err, CalendarError::Api { ref reason, .. } if reason.as_deref() == Some("authError")));
    }
}
