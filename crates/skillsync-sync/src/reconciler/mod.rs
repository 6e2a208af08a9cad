//! Reconcilers: bring one remote collection into the local store
//!
//! Every reconciler follows the same shape:
//!
//! 1. Pick the mode: incremental when a cursor is stored and the pass is not
//!    forced, otherwise full over a fixed retrospective window
//! 2. Page through the listing, applying each page in its own transaction
//!    and persisting the cursor as soon as a page carries one
//! 3. Stop at the last page, or early when the page or time budget runs
//!    out (a truncated pass). The next page token is saved as a
//!    [`ListingResume`] so the following pass continues the same listing
//! 4. On a rejected cursor or resume token, clear it and restart once in
//!    full mode
//! 5. Only a completed pass moves the watermark and prunes
//!
//! Remote failures never escape a reconciler; they end up in the
//! [`PassReport`] outcome.

pub mod calendar;
pub mod calendar_list;
pub mod drive;

pub use calendar::EventReconciler;
pub use calendar_list::CalendarListReconciler;
pub use drive::DriveReconciler;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skillsync_core::domain::{
    CollectionId, CollectionMeta, ListingResume, SyncStateKey, SyncToken,
};
use skillsync_core::ports::{ApplyStats, ILocalStore};
use tracing::warn;

use crate::SyncError;

// ============================================================================
// Pass options and results
// ============================================================================

/// Caller-supplied knobs of one pass
#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    /// Ignore a stored cursor and list the full window
    pub force_full: bool,
    /// Extend a full-mode listing back to this instant
    pub time_min_override: Option<DateTime<Utc>>,
    /// Hard stop shared by every pass of a run
    pub deadline: Option<Instant>,
}

impl PassOptions {
    pub fn forced() -> Self {
        Self {
            force_full: true,
            ..Default::default()
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_time_min_override(mut self, time_min: DateTime<Utc>) -> Self {
        self.time_min_override = Some(time_min);
        self
    }

    /// Lower bound of a full listing: the window start, or earlier if asked
    pub(crate) fn full_window_start(&self, now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
        let window_start = now - window;
        match self.time_min_override {
            Some(requested) => requested.min(window_start),
            None => window_start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    PageBudget,
    TimeBudget,
}

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PassOutcome {
    /// Every page was fetched; watermark moved and pruning ran
    Completed,
    /// Stopped early with pages left; no watermark update, no pruning
    Truncated(TruncationReason),
    /// The collection cannot be listed (not found, unsupported)
    Skipped(String),
    /// No usable credential
    NotConnected,
    Failed(String),
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed)
    }

    /// Completed or truncated: some pages were applied cleanly
    pub fn made_progress(&self) -> bool {
        matches!(self, PassOutcome::Completed | PassOutcome::Truncated(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            PassOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    /// Collection id, or `calendarList` for the collection list itself
    pub target: String,
    pub mode: SyncMode,
    pub outcome: PassOutcome,
    pub pages: u32,
    pub stats: ApplyStats,
    pub pruned: u64,
    /// The stored cursor was rejected and the pass restarted in full mode
    pub full_resync: bool,
    /// Continued a listing left unfinished by an earlier pass
    pub resumed: bool,
    /// Detail rows fetched by the Drive content phase
    pub content_fetched: u32,
}

impl PassReport {
    pub fn new(target: impl Into<String>, mode: SyncMode) -> Self {
        Self {
            target: target.into(),
            mode,
            outcome: PassOutcome::Completed,
            pages: 0,
            stats: ApplyStats::default(),
            pruned: 0,
            full_resync: false,
            resumed: false,
            content_fetched: 0,
        }
    }
}

/// Outcome for a failure that ended a pass
pub(crate) fn outcome_for(error: &SyncError) -> PassOutcome {
    match error {
        SyncError::Remote(e) if e.is_auth() => PassOutcome::NotConnected,
        SyncError::Remote(e) if e.is_not_found_or_unsupported() => {
            PassOutcome::Skipped(e.to_string())
        }
        other => PassOutcome::Failed(other.to_string()),
    }
}

// ============================================================================
// Budget
// ============================================================================

/// Page and wall-clock limits of one pass
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    deadline: Instant,
    max_pages: u32,
}

impl Budget {
    pub fn new(max_pages: u32, time_budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + time_budget,
            max_pages,
        }
    }

    /// Never runs past `deadline`, if one is given
    pub fn capped_at(mut self, deadline: Option<Instant>) -> Self {
        if let Some(deadline) = deadline {
            self.deadline = self.deadline.min(deadline);
        }
        self
    }

    pub fn time_exhausted(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Checked between pages, after `pages` pages have been applied
    pub fn exceeded(&self, pages: u32) -> Option<TruncationReason> {
        if pages >= self.max_pages {
            Some(TruncationReason::PageBudget)
        } else if self.time_exhausted() {
            Some(TruncationReason::TimeBudget)
        } else {
            None
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

// ============================================================================
// Sync state helpers
// ============================================================================

/// Reads a JSON sync-state record; unreadable records count as absent
pub(crate) async fn read_json<T: DeserializeOwned>(
    store: &dyn ILocalStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    let Some(raw) = store.get_state(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key, error = %e, "Ignoring unreadable sync state entry");
            Ok(None)
        }
    }
}

pub(crate) async fn write_json<T: Serialize>(
    store: &dyn ILocalStore,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set_state(key, &raw).await
}

/// Watermark record of `id`, default if never written
pub async fn load_meta(store: &dyn ILocalStore, id: &CollectionId) -> anyhow::Result<CollectionMeta> {
    Ok(read_json(store, &SyncStateKey::meta(id))
        .await?
        .unwrap_or_default())
}

pub(crate) async fn save_meta(
    store: &dyn ILocalStore,
    id: &CollectionId,
    meta: &CollectionMeta,
) -> anyhow::Result<()> {
    write_json(store, &SyncStateKey::meta(id), meta).await
}

/// Stored cursor under `key`; cursors are raw strings, not JSON
pub(crate) async fn load_cursor(store: &dyn ILocalStore, key: &str) -> anyhow::Result<Option<SyncToken>> {
    Ok(store
        .get_state(key)
        .await?
        .and_then(|raw| SyncToken::new(raw).ok()))
}

/// Stored resume point under `key`, if it continues a listing started from `cursor`
///
/// A record left by a different listing is dropped.
pub(crate) async fn load_resume(
    store: &dyn ILocalStore,
    key: &str,
    cursor: Option<&str>,
) -> anyhow::Result<Option<ListingResume>> {
    let Some(resume) = read_json::<ListingResume>(store, key).await? else {
        return Ok(None);
    };
    if resume.cursor.as_deref() == cursor {
        Ok(Some(resume))
    } else {
        store.delete_state(key).await?;
        Ok(None)
    }
}

pub(crate) async fn save_resume(
    store: &dyn ILocalStore,
    key: &str,
    page_token: &str,
    time_min: Option<DateTime<Utc>>,
    cursor: Option<&str>,
) -> anyhow::Result<()> {
    let resume = ListingResume {
        page_token: page_token.to_string(),
        time_min,
        cursor: cursor.map(str::to_string),
        saved_at: Utc::now(),
    };
    write_json(store, key, &resume).await
}
