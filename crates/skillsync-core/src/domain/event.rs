//! Calendar events

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::CollectionId;
use super::payload::ExtensionPayload;

/// Start or end of an event
///
/// Serializes in the vendor's shape: `{"date": "2026-03-01"}` for all-day
/// values, `{"dateTime": "2026-03-01T09:00:00+01:00"}` for timed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventTime {
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl EventTime {
    /// Instant used for ordering and range queries
    ///
    /// All-day dates are treated as UTC midnight.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EventTime::Date(date) => date.and_time(NaiveTime::MIN).and_utc(),
            EventTime::DateTime(dt) => dt.with_timezone(&Utc),
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }
}

/// A calendar event as cached locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub calendar_id: CollectionId,
    pub id: String,
    pub summary: Option<String>,
    /// Vendor status: `confirmed`, `tentative` or `cancelled`
    pub status: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// Vendor last-modified time; drives last-writer-wins
    pub updated: Option<DateTime<Utc>>,
    pub payload: ExtensionPayload,
    pub synced_at: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn start_ts(&self) -> DateTime<Utc> {
        self.start.timestamp()
    }

    pub fn end_ts(&self) -> DateTime<Utc> {
        self.end.timestamp()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_all_day_is_utc_midnight() {
        let t = EventTime::Date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(t.timestamp(), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert!(t.is_all_day());
    }

    #[test]
    fn test_timed_uses_offset() {
        let dt = DateTime::parse_from_rfc3339("2026-03-01T09:00:00+02:00").unwrap();
        let t = EventTime::DateTime(dt);
        assert_eq!(t.timestamp(), Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap());
        assert!(!t.is_all_day());
    }

    #[test]
    fn test_vendor_shape() {
        let t = EventTime::Date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"date":"2026-03-01"}"#);

        let parsed: EventTime =
            serde_json::from_str(r#"{"dateTime":"2026-03-01T09:00:00Z"}"#).unwrap();
        assert_eq!(
            parsed.timestamp(),
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
        );
    }
}
