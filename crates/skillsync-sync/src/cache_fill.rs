//! Query-time cache fill
//!
//! Reads are served from the local store. When the store cannot answer (a
//! ranged read outside cached coverage, a point read that misses), a pass
//! scoped to that one collection runs first and the store is read again.
//!
//! Scoped passes do not take the orchestrator's run guard. They share the
//! reconciler code, and the timestamp-gated upserts keep a scoped pass
//! racing a full run safe.
//!
//! Nothing is fetched from before the retention cutoff, since a completed
//! pass prunes it again. A ranged read reaching behind the cutoff fills only
//! the part after it and reports `retention_limited`.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use skillsync_core::domain::{
    CalendarEvent, Change, CollectionId, Document, DriveFile, RemoteCollection, RequestedRange,
    Spreadsheet, SyncStateKey, TimeRange,
};
use skillsync_core::ports::FileFilter;
use tracing::{debug, info, warn};

use crate::context::SyncContext;
use crate::reconciler::{
    load_meta, write_json, CalendarListReconciler, DriveReconciler, EventReconciler, PassOptions,
    PassReport,
};
use crate::SyncError;

/// Alias accepted for the user's primary calendar
pub const PRIMARY_ALIAS: &str = "primary";

/// Result of a ranged event read
#[derive(Debug, Clone, Serialize)]
pub struct EventsRead {
    pub events: Vec<CalendarEvent>,
    /// Whether the read triggered a scoped pass
    pub fetched: bool,
    /// Part of the range lies before the retention cutoff and was served
    /// only from whatever the cache still holds
    pub retention_limited: bool,
    pub pass: Option<PassReport>,
}

#[derive(Clone)]
pub struct CacheFill {
    ctx: Arc<SyncContext>,
}

impl CacheFill {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Maps a caller-supplied calendar id; `None` and `primary` mean the
    /// cached primary calendar
    pub async fn resolve_calendar(&self, requested: Option<&str>) -> Result<CollectionId, SyncError> {
        match requested.map(str::trim) {
            Some(id) if !id.is_empty() && id != PRIMARY_ALIAS => Ok(CollectionId::new(id)?),
            _ => {
                let collections = self.list_calendars().await?;
                match collections.into_iter().find(|c| c.primary) {
                    Some(primary) => Ok(primary.id),
                    None => Ok(CollectionId::new(PRIMARY_ALIAS)?),
                }
            }
        }
    }

    /// Cached calendars; discovers them first if none are cached
    pub async fn list_calendars(&self) -> Result<Vec<RemoteCollection>, SyncError> {
        let store = &self.ctx.store;
        let collections = store.list_collections().await?;
        if !collections.is_empty() {
            return Ok(collections);
        }
        debug!("No calendars cached, discovering");
        let pass = CalendarListReconciler::new(&self.ctx)
            .reconcile(&PassOptions::default())
            .await;
        if let Some(error) = pass.outcome.error_message() {
            warn!(%error, "Calendar discovery failed");
        }
        Ok(store.list_collections().await?)
    }

    /// Events overlapping `range`, filling the cache first if it does not
    /// cover the range
    #[tracing::instrument(skip(self, calendar_id, range), fields(calendar_id = %calendar_id))]
    pub async fn list_events(
        &self,
        calendar_id: &CollectionId,
        range: &TimeRange,
    ) -> Result<EventsRead, SyncError> {
        let store = self.ctx.store.as_ref();
        let cutoff = Utc::now() - self.ctx.settings.retention;
        let retention_limited = range.start() < cutoff;
        let fillable = if !retention_limited {
            Some(*range)
        } else if range.end() > cutoff {
            Some(TimeRange::new(cutoff, range.end())?)
        } else {
            None
        };

        let pass = match fillable {
            None => {
                info!(%cutoff, "Range ends before the retention cutoff, serving cache only");
                None
            }
            Some(fillable) => self.fill_events(calendar_id, &fillable).await?,
        };

        let requested = RequestedRange {
            start: range.start(),
            end: range.end(),
            requested_at: Utc::now(),
            fetched: pass.is_some(),
        };
        if let Err(e) = write_json(
            store,
            &SyncStateKey::last_requested_range(calendar_id),
            &requested,
        )
        .await
        {
            warn!(error = %format!("{e:#}"), "Failed to record requested range");
        }

        let events = store.query_events(calendar_id, range).await?;
        Ok(EventsRead {
            events,
            fetched: pass.is_some(),
            retention_limited,
            pass,
        })
    }

    /// Runs a scoped pass unless the cache already covers `range`
    async fn fill_events(
        &self,
        calendar_id: &CollectionId,
        range: &TimeRange,
    ) -> Result<Option<PassReport>, SyncError> {
        let store = self.ctx.store.as_ref();
        let covered = store
            .event_coverage(calendar_id)
            .await?
            .is_some_and(|coverage| coverage.covers(range));
        if covered {
            debug!("Range covered by cache");
            return Ok(None);
        }

        let meta = load_meta(store, calendar_id).await?;
        // Incremental passes cannot reach behind the last full window
        let before_window = meta
            .window_start
            .is_some_and(|window_start| range.start() < window_start);
        let options = PassOptions {
            force_full: before_window,
            ..Default::default()
        }
        .with_time_min_override(range.start());
        info!(before_window, "Range not covered, running scoped pass");
        Ok(Some(
            EventReconciler::new(&self.ctx)
                .reconcile(calendar_id, &options)
                .await,
        ))
    }

    /// Store, then a scoped pass, then a direct fetch
    pub async fn get_event(
        &self,
        calendar_id: &CollectionId,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, SyncError> {
        let store = &self.ctx.store;
        if let Some(event) = store.get_event(calendar_id, event_id).await? {
            return Ok(Some(event));
        }

        debug!(%calendar_id, event_id, "Event not cached, running scoped pass");
        EventReconciler::new(&self.ctx)
            .reconcile(calendar_id, &PassOptions::default())
            .await;
        if let Some(event) = store.get_event(calendar_id, event_id).await? {
            return Ok(Some(event));
        }

        match self.ctx.calendar.get_event(calendar_id, event_id).await {
            Ok(event) => {
                store
                    .apply_event_changes(calendar_id, &[Change::Upsert(event.clone())])
                    .await?;
                Ok(Some(event))
            }
            Err(e) if e.is_not_found_or_unsupported() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store, then a scoped drive pass, then a direct fetch
    pub async fn get_file(&self, file_id: &str) -> Result<Option<DriveFile>, SyncError> {
        let store = &self.ctx.store;
        if let Some(file) = store.get_file(file_id).await? {
            return Ok(Some(file));
        }

        debug!(file_id, "File not cached, running scoped drive pass");
        DriveReconciler::new(&self.ctx)
            .reconcile(&PassOptions::default())
            .await;
        if let Some(file) = store.get_file(file_id).await? {
            return Ok(Some(file));
        }

        match self.ctx.drive.get_file(file_id).await {
            Ok(file) => {
                store
                    .apply_file_changes(&[Change::Upsert(file.clone())])
                    .await?;
                Ok(Some(file))
            }
            Err(e) if e.is_not_found_or_unsupported() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Cached files; runs a drive pass first if the tree was never synced
    pub async fn list_files(&self, filter: &FileFilter) -> Result<Vec<DriveFile>, SyncError> {
        let store = self.ctx.store.as_ref();
        let meta = load_meta(store, &CollectionId::drive()).await?;
        if meta.last_full_sync.is_none() {
            debug!("Drive never synced, running drive pass");
            DriveReconciler::new(&self.ctx)
                .reconcile(&PassOptions::default())
                .await;
        }
        Ok(store.list_files(filter).await?)
    }

    pub async fn get_spreadsheet(&self, id: &str) -> Result<Option<Spreadsheet>, SyncError> {
        let store = &self.ctx.store;
        if let Some(sheet) = store.get_spreadsheet(id).await? {
            return Ok(Some(sheet));
        }
        let mut sheet = match self.ctx.drive.get_spreadsheet(id).await {
            Ok(sheet) => sheet,
            Err(e) if e.is_not_found_or_unsupported() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        sheet.modified_time = store.get_file(id).await?.and_then(|f| f.modified_time);
        store.upsert_spreadsheet(&sheet).await?;
        Ok(Some(sheet))
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, SyncError> {
        let store = &self.ctx.store;
        if let Some(doc) = store.get_document(id).await? {
            return Ok(Some(doc));
        }
        let mut doc = match self.ctx.drive.get_document(id).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found_or_unsupported() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        doc.modified_time = store.get_file(id).await?.and_then(|f| f.modified_time);
        store.upsert_document(&doc).await?;
        Ok(Some(doc))
    }
}
