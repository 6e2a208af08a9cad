//! Local store port (driven/secondary port)
//!
//! This module defines the interface for persisting the cached entities
//! (collections, events, files, spreadsheets, documents) and the generic
//! key/value sync state.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - Every `apply_*` and `upsert_collections` call is atomic: either the
//!   whole batch is committed or nothing is.
//! - Item writes are gated by the vendor `updated`/`modifiedTime`: an
//!   incoming row replaces a stored one only if either timestamp is absent
//!   or incoming >= stored. Applying the same batch twice is a no-op.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    newtypes::{CollectionId, TimeRange},
    CalendarEvent, Change, ContentRef, Document, DriveFile, RemoteCollection, Spreadsheet,
};

// ============================================================================
// Query and result types
// ============================================================================

/// Outcome of applying one page of changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStats {
    /// Rows inserted or replaced
    pub upserted: u64,
    /// Incoming rows rejected because the stored row is newer
    pub skipped_stale: u64,
    /// Rows removed because the vendor reported a deletion
    pub deleted: u64,
}

impl ApplyStats {
    pub fn merge(&mut self, other: ApplyStats) {
        self.upserted += other.upserted;
        self.skipped_stale += other.skipped_stale;
        self.deleted += other.deleted;
    }

    /// Entries that changed local state
    pub fn applied(&self) -> u64 {
        self.upserted + self.deleted
    }
}

/// Time span of a collection's cached events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub earliest_start: DateTime<Utc>,
    pub latest_end: DateTime<Utc>,
    pub item_count: u64,
}

impl Coverage {
    /// True if at least one item exists and the cached span includes `range`
    pub fn covers(&self, range: &TimeRange) -> bool {
        self.item_count > 0
            && self.earliest_start <= range.start()
            && self.latest_end >= range.end()
    }
}

/// Row counts per entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTotals {
    pub collections: u64,
    pub events: u64,
    pub files: u64,
    pub spreadsheets: u64,
    pub documents: u64,
}

/// Filter criteria for listing cached drive files
///
/// All fields are optional; when `None`, no filtering is applied for that field.
/// Multiple filters are combined with AND logic. Results are ordered by
/// modification time, newest first.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Case-insensitive substring of the file name
    pub name_contains: Option<String>,
    /// Exact MIME type
    pub mime_type: Option<String>,
    /// Files modified strictly after this timestamp
    pub modified_after: Option<DateTime<Utc>>,
    /// Include trashed files (excluded by default)
    pub include_trashed: bool,
    /// Maximum rows returned
    pub limit: Option<u32>,
}

impl FileFilter {
    /// Creates a new empty filter (matches all non-trashed files)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_modified_after(mut self, since: DateTime<Utc>) -> Self {
        self.modified_after = Some(since);
        self
    }

    pub fn with_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// ILocalStore trait
// ============================================================================

/// Port trait for the local relational cache
///
/// ## Implementation Notes
///
/// - Implementations must be thread-safe (`Send + Sync`)
/// - Sync state values are opaque strings; callers encode JSON themselves
/// - Store operations never reach the network
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    // --- collections ---

    /// Inserts or replaces collections in a single transaction
    async fn upsert_collections(&self, collections: &[RemoteCollection]) -> Result<()>;

    /// Marks a collection hidden and unselected; returns false if unknown
    async fn mark_collection_removed(&self, id: &CollectionId) -> Result<bool>;

    /// Lists all cached collections, primary first then by summary
    async fn list_collections(&self) -> Result<Vec<RemoteCollection>>;

    async fn get_collection(&self, id: &CollectionId) -> Result<Option<RemoteCollection>>;

    // --- events ---

    /// Applies one listing page of event changes atomically
    async fn apply_event_changes(
        &self,
        calendar_id: &CollectionId,
        changes: &[Change<CalendarEvent>],
    ) -> Result<ApplyStats>;

    async fn get_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>>;

    /// Events overlapping `range`, ordered by start time
    async fn query_events(
        &self,
        calendar_id: &CollectionId,
        range: &TimeRange,
    ) -> Result<Vec<CalendarEvent>>;

    /// Earliest start and latest end of cached events; `None` if empty
    async fn event_coverage(&self, calendar_id: &CollectionId) -> Result<Option<Coverage>>;

    /// Deletes events that ended before `cutoff`; returns rows removed
    async fn prune_events(&self, calendar_id: &CollectionId, cutoff: DateTime<Utc>)
        -> Result<u64>;

    // --- drive ---

    /// Applies one listing page of file changes atomically
    ///
    /// Removing a file also removes its spreadsheet/document detail row.
    async fn apply_file_changes(&self, changes: &[Change<DriveFile>]) -> Result<ApplyStats>;

    async fn get_file(&self, file_id: &str) -> Result<Option<DriveFile>>;

    async fn list_files(&self, filter: &FileFilter) -> Result<Vec<DriveFile>>;

    /// Deletes files last modified before `cutoff` and their detail rows
    async fn prune_files(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Spreadsheet/document files whose detail row is missing or stale,
    /// most recently modified first. Files marked unavailable at their
    /// current modified time are left out.
    async fn files_needing_content(&self, limit: u32) -> Result<Vec<ContentRef>>;

    /// Keeps `item` out of the content queue until its file is modified again
    async fn mark_content_unavailable(&self, item: &ContentRef, reason: &str) -> Result<()>;

    /// Returns false if a newer detail row was already stored
    async fn upsert_spreadsheet(&self, spreadsheet: &Spreadsheet) -> Result<bool>;

    /// Returns false if a newer detail row was already stored
    async fn upsert_document(&self, document: &Document) -> Result<bool>;

    async fn get_spreadsheet(&self, id: &str) -> Result<Option<Spreadsheet>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    // --- sync state ---

    async fn get_state(&self, key: &str) -> Result<Option<String>>;

    async fn set_state(&self, key: &str, value: &str) -> Result<()>;

    async fn delete_state(&self, key: &str) -> Result<()>;

    // --- statistics ---

    async fn totals(&self) -> Result<StoreTotals>;
}
