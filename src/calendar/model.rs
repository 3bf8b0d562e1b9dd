//! Calendar event shapes.
//!
//! Events are passed through to the client mostly untouched; only the fields
//! this service reads are typed, everything else rides along in `extra`.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Start or end of an event: a timestamp, or a date for all-day events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    /// A UTC timestamp, tagged `timeZone: "UTC"`.
    pub fn utc(at: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            date: None,
            time_zone: Some("UTC".to_string()),
        }
    }

    /// The exact instant, for timed events only.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        let raw = self.date_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The instant, or local midnight in `tz` for all-day events.
    pub fn start_in(&self, tz: Tz) -> Option<DateTime<Tz>> {
        if let Some(at) = self.instant() {
            return Some(at.with_timezone(&tz));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).earliest()
    }
}

/// A calendar event as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CalendarEvent {
    /// Start and end instants, when both are timed.
    pub fn timed_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start.as_ref()?.instant()?;
        let end = self.end.as_ref()?.instant()?;
        Some((start, end))
    }
}

/// Query for listing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Lower bound (RFC 3339), exclusive of events ending before it.
    pub time_min: String,
    /// Upper bound (RFC 3339), exclusive of events starting after it.
    pub time_max: String,
    pub max_results: Option<u32>,
}

impl EventQuery {
    pub fn between(time_min: impl Into<String>, time_max: impl Into<String>) -> Self {
        Self {
            time_min: time_min.into(),
            time_max: time_max.into(),
            max_results: None,
        }
    }

    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = Some(max);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attendee {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceSolutionKey {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConferenceRequest {
    pub request_id: String,
    pub conference_solution_key: ConferenceSolutionKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    pub create_request: CreateConferenceRequest,
}

/// Body for creating an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<Attendee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference_data: Option<ConferenceData>,
}

impl NewEvent {
    /// A meeting with one attendee and a Google Meet link request.
    pub fn meeting(
        attendee_email: &str,
        description: Option<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        request_id: String,
    ) -> Self {
        Self {
            summary: format!("Meeting with {attendee_email}"),
            description,
            start: EventTime::utc(start),
            end: EventTime::utc(end),
            attendees: vec![Attendee {
                email: attendee_email.to_string(),
            }],
            conference_data: Some(ConferenceData {
                create_request: CreateConferenceRequest {
                    request_id,
                    conference_solution_key: ConferenceSolutionKey {
                        kind: "hangoutsMeet".to_string(),
                    },
                },
            }),
        }
    }
}
