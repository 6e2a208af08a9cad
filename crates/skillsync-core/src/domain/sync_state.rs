//! Sync state keys and the records stored under them
//!
//! The `sync_state` table is a plain key/value store. Cursors are stored as
//! the raw token string; watermarks and diagnostics are stored as JSON.
//!
//! | Key                             | Value                 |
//! |---------------------------------|-----------------------|
//! | `eventsSyncToken:<calendarId>`  | sync token            |
//! | `eventsResume:<calendarId>`     | [`ListingResume`]     |
//! | `calendarMeta:<calendarId>`     | [`CollectionMeta`]    |
//! | `lastRequestedRange:<calendarId>` | [`RequestedRange`]  |
//! | `calendarListSyncToken`         | sync token            |
//! | `drivePageToken`                | changes page token    |
//! | `driveResume`                   | [`ListingResume`]     |
//! | `driveMeta`                     | [`CollectionMeta`]    |
//! | `lastSyncRun`                   | [`RunSummary`]        |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::newtypes::CollectionId;

/// Builders for namespaced sync state keys
pub struct SyncStateKey;

impl SyncStateKey {
    pub const CALENDAR_LIST_SYNC_TOKEN: &'static str = "calendarListSyncToken";
    pub const DRIVE_PAGE_TOKEN: &'static str = "drivePageToken";
    pub const DRIVE_RESUME: &'static str = "driveResume";
    pub const DRIVE_META: &'static str = "driveMeta";
    pub const LAST_SYNC_RUN: &'static str = "lastSyncRun";

    pub fn events_sync_token(calendar_id: &CollectionId) -> String {
        format!("eventsSyncToken:{}", calendar_id)
    }

    pub fn events_resume(calendar_id: &CollectionId) -> String {
        format!("eventsResume:{}", calendar_id)
    }

    pub fn calendar_meta(calendar_id: &CollectionId) -> String {
        format!("calendarMeta:{}", calendar_id)
    }

    pub fn last_requested_range(calendar_id: &CollectionId) -> String {
        format!("lastRequestedRange:{}", calendar_id)
    }

    /// Watermark key for any collection, including the Drive tree
    pub fn meta(id: &CollectionId) -> String {
        if id.as_str() == CollectionId::DRIVE {
            Self::DRIVE_META.to_string()
        } else {
            Self::calendar_meta(id)
        }
    }
}

/// Watermark record of one collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    /// Completion time of the last non-truncated pass
    pub last_full_sync: Option<DateTime<Utc>>,
    /// Items applied by that pass
    #[serde(default)]
    pub last_item_count: u64,
    /// Lower bound used by the last full-mode listing
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
}

impl CollectionMeta {
    /// True if the watermark is missing or older than `threshold` before `now`
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        match self.last_full_sync {
            Some(at) => now - at > threshold,
            None => true,
        }
    }
}

/// Where an unfinished listing picks up on the next pass
///
/// Written after every page that has a successor and removed once the
/// listing reaches its last page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResume {
    /// Vendor token of the next page to fetch
    pub page_token: String,
    /// Lower bound of a full-mode listing; page tokens only hold for the same query
    #[serde(default)]
    pub time_min: Option<DateTime<Utc>>,
    /// Sync token an incremental listing was started from, or the change-log
    /// start token a Drive full listing adopts once it completes
    #[serde(default)]
    pub cursor: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// A ranged read as recorded for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
    /// Whether the read triggered a scoped reconciliation
    pub fetched: bool,
}

/// Summary of the last orchestrator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub collections_synced: usize,
    pub items_applied: u64,
    pub error: Option<String>,
}
