//! Calendar event reconciler
//!
//! Full mode lists events starting at `now - full_sync_window` (or earlier
//! when a cache fill asks for it) ordered by start time; incremental mode
//! replays the stored `eventsSyncToken:<id>` cursor, which also reports
//! cancelled events as removals.
//!
//! The cursor is written after every page that carries one. Google only
//! sends `nextSyncToken` on the last page, so every intermediate page
//! stores its successor under `eventsResume:<id>` instead. The next pass
//! continues that listing with the same query rather than starting over.

use chrono::{DateTime, Utc};
use skillsync_core::domain::{CollectionId, ListingResume, SyncStateKey, SyncToken};
use skillsync_core::ports::ListRequest;
use tracing::{debug, info, warn};

use super::{
    load_cursor, load_meta, load_resume, outcome_for, save_meta, save_resume, Budget, PassOptions,
    PassOutcome, PassReport, SyncMode,
};
use crate::context::SyncContext;
use crate::SyncError;

pub struct EventReconciler<'a> {
    ctx: &'a SyncContext,
}

impl<'a> EventReconciler<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    /// Reconciles the events of `calendar_id`
    #[tracing::instrument(skip(self, calendar_id, options), fields(calendar_id = %calendar_id))]
    pub async fn reconcile(&self, calendar_id: &CollectionId, options: &PassOptions) -> PassReport {
        let settings = &self.ctx.settings;
        let store = self.ctx.store.as_ref();
        let started_at = Utc::now();
        let budget = Budget::new(settings.max_pages_per_pass, settings.time_budget)
            .capped_at(options.deadline);
        let cursor_key = SyncStateKey::events_sync_token(calendar_id);
        let resume_key = SyncStateKey::events_resume(calendar_id);
        let mut full_time_min = options.full_window_start(started_at, settings.full_sync_window);

        let (mut cursor, mut resume) = match self
            .load_position(&cursor_key, &resume_key, options.force_full)
            .await
        {
            Ok(position) => position,
            Err(e) => {
                let mut report = PassReport::new(calendar_id.as_str(), SyncMode::Full);
                report.outcome = outcome_for(&SyncError::Store(e));
                return report;
            }
        };

        let mode = if cursor.is_some() {
            SyncMode::Incremental
        } else {
            SyncMode::Full
        };
        let mut report = PassReport::new(calendar_id.as_str(), mode);
        if let Some(resume) = &resume {
            report.resumed = true;
            if let Some(time_min) = resume.time_min {
                full_time_min = time_min;
            }
        }
        info!(mode = ?mode, resumed = report.resumed, "Starting event pass");

        loop {
            let page_token = resume.as_ref().map(|r| r.page_token.clone());
            let result = self
                .run_pages(
                    calendar_id,
                    cursor.clone(),
                    page_token,
                    full_time_min,
                    &budget,
                    &mut report,
                )
                .await;
            match result {
                Ok(outcome) => {
                    report.outcome = outcome;
                    break;
                }
                Err(SyncError::Remote(e)) if e.is_cursor_invalid() => {
                    let cleared = match store.delete_state(&cursor_key).await {
                        Ok(()) => store.delete_state(&resume_key).await,
                        Err(clear_err) => Err(clear_err),
                    };
                    if let Err(clear_err) = cleared {
                        report.outcome = outcome_for(&SyncError::Store(clear_err));
                        break;
                    }
                    let restartable = report.mode == SyncMode::Incremental || resume.is_some();
                    if restartable && !report.full_resync {
                        warn!(error = %e, "Stored listing position rejected, retrying once in full mode");
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
            if let Err(e) = self
                .finish_completed(calendar_id, &mut report, full_time_min)
                .await
            {
                report.outcome = outcome_for(&SyncError::Store(e));
            }
        }

        match &report.outcome {
            PassOutcome::Completed | PassOutcome::Truncated(_) => info!(
                outcome = ?report.outcome,
                pages = report.pages,
                upserted = report.stats.upserted,
                deleted = report.stats.deleted,
                skipped_stale = report.stats.skipped_stale,
                pruned = report.pruned,
                elapsed_ms = budget.elapsed_ms(),
                "Event pass finished"
            ),
            PassOutcome::Skipped(reason) => {
                warn!(%reason, "Calendar cannot be listed, skipping")
            }
            PassOutcome::NotConnected => info!("Not connected, event pass abandoned"),
            PassOutcome::Failed(error) => warn!(%error, "Event pass failed"),
        }
        report
    }

    /// Stored cursor and resume point; a forced pass discards both
    async fn load_position(
        &self,
        cursor_key: &str,
        resume_key: &str,
        force_full: bool,
    ) -> anyhow::Result<(Option<SyncToken>, Option<ListingResume>)> {
        let store = self.ctx.store.as_ref();
        if force_full {
            store.delete_state(resume_key).await?;
            return Ok((None, None));
        }
        let cursor = load_cursor(store, cursor_key).await?;
        let resume = load_resume(store, resume_key, cursor.as_ref().map(|t| t.as_str())).await?;
        Ok((cursor, resume))
    }

    /// Pages through one listing; errors leave already-applied pages in place
    async fn run_pages(
        &self,
        calendar_id: &CollectionId,
        cursor: Option<SyncToken>,
        page_token: Option<String>,
        full_time_min: DateTime<Utc>,
        budget: &Budget,
        report: &mut PassReport,
    ) -> Result<PassOutcome, SyncError> {
        let store = self.ctx.store.as_ref();
        let cursor_key = SyncStateKey::events_sync_token(calendar_id);
        let resume_key = SyncStateKey::events_resume(calendar_id);
        let listing_cursor = cursor.as_ref().map(|t| t.as_str().to_string());
        let resume_time_min = cursor.is_none().then_some(full_time_min);

        let mut request = ListRequest::new(self.ctx.settings.calendar_page_size);
        request = match cursor {
            Some(token) => request.with_sync_token(token),
            None => request
                .with_time_min(full_time_min)
                .with_order_by("startTime"),
        };
        request.page_token = page_token;

        let mut pages: u32 = 0;
        loop {
            let page = self.ctx.calendar.list_events(calendar_id, &request).await?;
            pages += 1;
            report.pages += 1;

            let stats = store.apply_event_changes(calendar_id, &page.items).await?;
            report.stats.merge(stats);

            if let Some(token) = &page.next_sync_token {
                store.set_state(&cursor_key, token.as_str()).await?;
            }
            match &page.next_page_token {
                Some(next) => {
                    save_resume(
                        store,
                        &resume_key,
                        next,
                        resume_time_min,
                        listing_cursor.as_deref(),
                    )
                    .await?
                }
                None => store.delete_state(&resume_key).await?,
            }
            debug!(
                page = pages,
                items = page.items.len(),
                upserted = stats.upserted,
                deleted = stats.deleted,
                has_more = page.has_more(),
                "Applied events page"
            );

            let Some(next) = page.next_page_token else {
                return Ok(PassOutcome::Completed);
            };
            if let Some(reason) = budget.exceeded(pages) {
                info!(pages, reason = ?reason, "Event pass truncated");
                return Ok(PassOutcome::Truncated(reason));
            }
            request.page_token = Some(next);
        }
    }

    /// Moves the watermark and prunes; only called for completed passes
    async fn finish_completed(
        &self,
        calendar_id: &CollectionId,
        report: &mut PassReport,
        full_time_min: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let store = self.ctx.store.as_ref();
        let now = Utc::now();

        let mut meta = load_meta(store, calendar_id).await?;
        meta.last_full_sync = Some(now);
        meta.last_item_count = report.stats.applied();
        if report.mode == SyncMode::Full {
            meta.window_start = Some(full_time_min);
        }
        save_meta(store, calendar_id, &meta).await?;

        let cutoff = now - self.ctx.settings.retention;
        report.pruned = store.prune_events(calendar_id, cutoff).await?;
        Ok(())
    }
}
