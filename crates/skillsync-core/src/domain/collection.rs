//! Remote collections
//!
//! A remote collection is an externally owned, independently versioned set
//! of items: one calendar, or the whole Drive file tree. Collections are
//! discovered by listing and are never deleted locally; a removal observed
//! remotely only flips the `hidden`/`selected` flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::CollectionId;
use super::payload::ExtensionPayload;

/// Kind of remote collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Calendar,
    DriveTree,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Calendar => "calendar",
            CollectionKind::DriveTree => "drive_tree",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(CollectionKind::Calendar),
            "drive_tree" => Some(CollectionKind::DriveTree),
            _ => None,
        }
    }
}

/// A calendar (or other listable collection) as cached locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCollection {
    pub id: CollectionId,
    pub kind: CollectionKind,
    pub summary: String,
    pub time_zone: Option<String>,
    /// Caller's access role, e.g. `owner`, `reader`, `freeBusyReader`
    pub access_role: Option<String>,
    pub primary: bool,
    pub hidden: bool,
    pub selected: bool,
    pub payload: ExtensionPayload,
    /// Local write time
    pub synced_at: DateTime<Utc>,
}

impl RemoteCollection {
    /// Creates a visible, selected calendar with no vendor payload
    pub fn calendar(id: CollectionId, summary: impl Into<String>) -> Self {
        Self {
            id,
            kind: CollectionKind::Calendar,
            summary: summary.into(),
            time_zone: None,
            access_role: None,
            primary: false,
            hidden: false,
            selected: true,
            payload: ExtensionPayload::empty(),
            synced_at: Utc::now(),
        }
    }

    /// Whether the periodic sync should consider this collection
    pub fn is_syncable(&self) -> bool {
        self.selected && !self.hidden
    }
}
