//! Drive reconciler
//!
//! Drive files form one flat collection, [`CollectionId::DRIVE`].
//!
//! - Full mode captures the change-log start token, then lists files
//!   modified inside the window. The start token becomes the cursor only
//!   once the listing completes; until then it rides along in the
//!   `driveResume` record with the next page token, so a truncated listing
//!   continues on the next pass.
//! - Incremental mode walks the change log. Every change-log page token is a
//!   valid resume point, so the cursor is advanced after each applied page
//!   and a truncated pass resumes exactly where it stopped.
//!
//! After the listing, a content phase fetches spreadsheet and document
//! details for files whose detail row is missing or older than the file.
//! Files whose details cannot be fetched are marked unavailable and leave
//! the queue until they change again.

use chrono::{DateTime, Utc};
use skillsync_core::domain::{
    Change, CollectionId, ContentKind, ContentRef, ListingResume, SyncStateKey,
};
use skillsync_core::ports::{ListRequest, RemoteError};
use tracing::{debug, info, warn};

use super::{
    load_meta, outcome_for, read_json, save_meta, save_resume, Budget, PassOptions, PassOutcome,
    PassReport, SyncMode,
};
use crate::context::SyncContext;
use crate::SyncError;

pub struct DriveReconciler<'a> {
    ctx: &'a SyncContext,
}

impl<'a> DriveReconciler<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(skip(self, options))]
    pub async fn reconcile(&self, options: &PassOptions) -> PassReport {
        let settings = &self.ctx.settings;
        let store = self.ctx.store.as_ref();
        let started_at = Utc::now();
        let budget = Budget::new(settings.max_pages_per_pass, settings.time_budget)
            .capped_at(options.deadline);
        let mut full_time_min = options.full_window_start(started_at, settings.full_sync_window);

        let (mut cursor, mut resume) = match self.load_position(options.force_full).await {
            Ok(position) => position,
            Err(e) => {
                let mut report = PassReport::new(CollectionId::DRIVE, SyncMode::Full);
                report.outcome = outcome_for(&SyncError::Store(e));
                return report;
            }
        };
        let mode = if cursor.is_some() {
            SyncMode::Incremental
        } else {
            SyncMode::Full
        };
        let mut report = PassReport::new(CollectionId::DRIVE, mode);
        if let Some(resume) = &resume {
            report.resumed = true;
            if let Some(time_min) = resume.time_min {
                full_time_min = time_min;
            }
        }
        info!(mode = ?mode, resumed = report.resumed, "Starting drive pass");

        loop {
            let result = match cursor.clone() {
                Some(token) => self.run_changes(token, &budget, &mut report).await,
                None => {
                    self.run_full(full_time_min, resume.clone(), &budget, &mut report)
                        .await
                }
            };
            match result {
                Ok(outcome) => {
                    report.outcome = outcome;
                    break;
                }
                Err(SyncError::Remote(e)) if e.is_cursor_invalid() => {
                    let cleared = match store.delete_state(SyncStateKey::DRIVE_PAGE_TOKEN).await {
                        Ok(()) => store.delete_state(SyncStateKey::DRIVE_RESUME).await,
                        Err(clear_err) => Err(clear_err),
                    };
                    if let Err(clear_err) = cleared {
                        report.outcome = outcome_for(&SyncError::Store(clear_err));
                        break;
                    }
                    let restartable = report.mode == SyncMode::Incremental || resume.is_some();
                    if restartable && !report.full_resync {
                        warn!(error = %e, "Drive listing position rejected, retrying once in full mode");
                        report.mode = SyncMode::Full;
                        report.full_resync = true;
                        report.resumed = false;
                        full_time_min =
                            options.full_window_start(started_at, settings.full_sync_window);
                        cursor = None;
                        resume = None;
                        continue;
                    }
                    report.outcome = PassOutcome::Failed(e.to_string());
                    break;
                }
                Err(e) => {
                    report.outcome = outcome_for(&e);
                    break;
                }
            }
        }

        if report.outcome.is_completed() {
            if let Err(e) = self.finish_completed(&mut report, full_time_min).await {
                report.outcome = outcome_for(&SyncError::Store(e));
            }
        }

        if report.outcome.made_progress() && !budget.time_exhausted() {
            match self.fetch_content(&budget).await {
                Ok(fetched) => report.content_fetched = fetched,
                Err(e) => report.outcome = outcome_for(&e),
            }
        }

        match &report.outcome {
            PassOutcome::Failed(error) => warn!(%error, "Drive pass failed"),
            PassOutcome::NotConnected => info!("Not connected, drive pass abandoned"),
            outcome => info!(
                outcome = ?outcome,
                pages = report.pages,
                upserted = report.stats.upserted,
                deleted = report.stats.deleted,
                pruned = report.pruned,
                content_fetched = report.content_fetched,
                elapsed_ms = budget.elapsed_ms(),
                "Drive pass finished"
            ),
        }
        report
    }

    /// Walks the change log from `page_token`
    async fn run_changes(
        &self,
        page_token: String,
        budget: &Budget,
        report: &mut PassReport,
    ) -> Result<PassOutcome, SyncError> {
        let store = &self.ctx.store;
        let mut request =
            ListRequest::new(self.ctx.settings.drive_page_size).with_page_token(Some(page_token));
        request.show_deleted = true;

        let mut pages: u32 = 0;
        loop {
            let page = self.ctx.drive.list_changes(&request).await?;
            pages += 1;
            report.pages += 1;

            let stats = store.apply_file_changes(&page.items).await?;
            report.stats.merge(stats);

            // Resume point: the next page, or the fresh start token on the last page
            let resume = page
                .next_page_token
                .clone()
                .or_else(|| page.next_sync_token.as_ref().map(|t| t.as_str().to_string()));
            if let Some(token) = &resume {
                store.set_state(SyncStateKey::DRIVE_PAGE_TOKEN, token).await?;
            }
            debug!(
                page = pages,
                items = page.items.len(),
                upserted = stats.upserted,
                deleted = stats.deleted,
                "Applied changes page"
            );

            let Some(next) = page.next_page_token else {
                return Ok(PassOutcome::Completed);
            };
            if let Some(reason) = budget.exceeded(pages) {
                info!(pages, reason = ?reason, "Drive pass truncated");
                return Ok(PassOutcome::Truncated(reason));
            }
            request.page_token = Some(next);
        }
    }

    /// Stored change-log cursor and full-listing resume point
    ///
    /// A resume point only applies while no cursor exists; a forced pass
    /// discards both.
    async fn load_position(
        &self,
        force_full: bool,
    ) -> anyhow::Result<(Option<String>, Option<ListingResume>)> {
        let store = self.ctx.store.as_ref();
        if force_full {
            store.delete_state(SyncStateKey::DRIVE_RESUME).await?;
            return Ok((None, None));
        }
        let cursor = store
            .get_state(SyncStateKey::DRIVE_PAGE_TOKEN)
            .await?
            .filter(|token| !token.is_empty());
        if cursor.is_some() {
            store.delete_state(SyncStateKey::DRIVE_RESUME).await?;
            return Ok((cursor, None));
        }
        let resume = read_json::<ListingResume>(store, SyncStateKey::DRIVE_RESUME)
            .await?
            .filter(|resume| resume.cursor.is_some());
        Ok((None, resume))
    }

    /// Lists files modified since `time_min`, newest first
    async fn run_full(
        &self,
        time_min: DateTime<Utc>,
        resume: Option<ListingResume>,
        budget: &Budget,
        report: &mut PassReport,
    ) -> Result<PassOutcome, SyncError> {
        let store = self.ctx.store.as_ref();
        let (start_token, page_token) = match resume {
            Some(ListingResume {
                cursor: Some(start_token),
                page_token,
                ..
            }) => (start_token, Some(page_token)),
            _ => (self.ctx.drive.start_page_token().await?, None),
        };
        let mut request = ListRequest::new(self.ctx.settings.drive_page_size)
            .with_time_min(time_min)
            .with_order_by("modifiedTime desc")
            .with_page_token(page_token);

        let mut pages: u32 = 0;
        loop {
            let page = self.ctx.drive.list_files(&request).await?;
            pages += 1;
            report.pages += 1;

            let changes: Vec<_> = page.items.into_iter().map(Change::Upsert).collect();
            let stats = store.apply_file_changes(&changes).await?;
            report.stats.merge(stats);
            debug!(
                page = pages,
                items = changes.len(),
                upserted = stats.upserted,
                "Applied files page"
            );

            let Some(next) = page.next_page_token else {
                store
                    .set_state(SyncStateKey::DRIVE_PAGE_TOKEN, &start_token)
                    .await?;
                store.delete_state(SyncStateKey::DRIVE_RESUME).await?;
                return Ok(PassOutcome::Completed);
            };
            save_resume(
                store,
                SyncStateKey::DRIVE_RESUME,
                &next,
                Some(time_min),
                Some(&start_token),
            )
            .await?;
            if let Some(reason) = budget.exceeded(pages) {
                info!(pages, reason = ?reason, "Drive pass truncated");
                return Ok(PassOutcome::Truncated(reason));
            }
            request.page_token = Some(next);
        }
    }

    async fn finish_completed(
        &self,
        report: &mut PassReport,
        full_time_min: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        let drive_id = CollectionId::drive();
        let now = Utc::now();

        let mut meta = load_meta(store, &drive_id).await?;
        meta.last_full_sync = Some(now);
        meta.last_item_count = report.stats.applied();
        if report.mode == SyncMode::Full {
            meta.window_start = Some(full_time_min);
        }
        save_meta(store, &drive_id, &meta).await?;

        report.pruned = store.prune_files(now - self.ctx.settings.retention).await?;
        Ok(())
    }

    /// Fetches missing or stale detail rows; returns how many were stored
    async fn fetch_content(&self, budget: &Budget) -> Result<u32, SyncError> {
        let store = &self.ctx.store;
        let pending = store
            .files_needing_content(self.ctx.settings.max_content_fetches)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }
        debug!(pending = pending.len(), "Fetching drive content");

        let mut fetched = 0;
        for item in pending {
            if budget.time_exhausted() {
                info!(fetched, "Time budget reached, deferring remaining content");
                break;
            }
            match self.fetch_one(&item).await {
                Ok(true) => fetched += 1,
                Ok(false) => {}
                Err(SyncError::Remote(e))
                    if e.is_not_found_or_unsupported()
                        || matches!(e, RemoteError::InvalidResponse(_)) =>
                {
                    debug!(file_id = %item.file_id, error = %e, "Content unavailable, marking");
                    store
                        .mark_content_unavailable(&item, &e.to_string())
                        .await?;
                }
                Err(SyncError::Remote(e))
                    if e.is_auth() || matches!(e, RemoteError::RateLimited { .. }) =>
                {
                    warn!(file_id = %item.file_id, error = %e, "Stopping content fetch");
                    break;
                }
                Err(SyncError::Remote(e)) => {
                    warn!(file_id = %item.file_id, error = %e, "Content fetch failed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(fetched)
    }

    async fn fetch_one(&self, item: &ContentRef) -> Result<bool, SyncError> {
        let store = &self.ctx.store;
        let stored = match item.kind {
            ContentKind::Spreadsheet => {
                let mut sheet = self.ctx.drive.get_spreadsheet(&item.file_id).await?;
                sheet.modified_time = item.modified_time;
                store.upsert_spreadsheet(&sheet).await?
            }
            ContentKind::Document => {
                let mut doc = self.ctx.drive.get_document(&item.file_id).await?;
                doc.modified_time = item.modified_time;
                store.upsert_document(&doc).await?
            }
        };
        Ok(stored)
    }
}
