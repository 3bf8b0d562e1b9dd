//! Meeting slot arithmetic: day windows, free slots and meeting start times.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use super::model::CalendarEvent;
use crate::error::CalendarError;

/// Bookable slot start times, local to the configured zone.
pub const AVAILABLE_SLOTS: &[&str] = &["08:00", "08:20", "08:40", "09:00", "09:20", "09:40"];

/// Length of a slot and of a created meeting.
pub const MEETING_MINUTES: i64 = 20;

/// Parse an availability date in `yyyyMMdd` form.
pub fn parse_compact_date(raw: &str) -> Result<NaiveDate, CalendarError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
        .map_err(|e| CalendarError::InvalidDate(format!("'{raw}': {e}")))
}

/// Local midnight to the following midnight, as UTC instants.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), CalendarError> {
    let start = local_instant(date.and_time(NaiveTime::MIN), tz)?;
    let next = date
        .succ_opt()
        .ok_or_else(|| CalendarError::InvalidDate(format!("no day after {date}")))?;
    let end = local_instant(next.and_time(NaiveTime::MIN), tz)?;
    Ok((start, end))
}

/// Bounds of "today" in `tz`.
pub fn today_bounds(now: DateTime<Utc>, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), CalendarError> {
    day_bounds(now.with_timezone(&tz).date_naive(), tz)
}

/// Slots on `date` that no timed event overlaps.
///
/// All-day events carry no instant and never block a slot.
pub fn free_slots(date: NaiveDate, tz: Tz, events: &[CalendarEvent]) -> Vec<String> {
    let busy: Vec<_> = events.iter().filter_map(CalendarEvent::timed_span).collect();

    AVAILABLE_SLOTS
        .iter()
        .filter(|slot| {
            let Ok(time) = NaiveTime::parse_from_str(slot, "%H:%M") else {
                return false;
            };
            let Ok(start) = local_instant(date.and_time(time), tz) else {
                return false;
            };
            let end = start + Duration::minutes(MEETING_MINUTES);
            !busy
                .iter()
                .any(|(ev_start, ev_end)| start < *ev_end && end > *ev_start)
        })
        .map(|slot| slot.to_string())
        .collect()
}

/// Start instant of a meeting given as `dd/MM/yyyy` and `HH:mm` in `tz`.
pub fn meeting_start(date: &str, time: &str, tz: Tz) -> Result<DateTime<Utc>, CalendarError> {
    let date = NaiveDate::parse_from_str(date.trim(), "%d/%m/%Y")
        .map_err(|e| CalendarError::InvalidDate(format!("date '{date}': {e}")))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|e| CalendarError::InvalidDate(format!("time '{time}': {e}")))?;
    local_instant(date.and_time(time), tz)
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times skipped by a DST jump are rejected.
fn local_instant(local: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, CalendarError> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CalendarError::InvalidDate(format!("{local} does not exist in {tz}")))
}
