//! Calendar list reconciler
//!
//! Discovers calendars and keeps their flags current. Calendars the vendor
//! reports as deleted are only marked hidden and unselected; their cached
//! events stay until retention pruning or a later removal.

use skillsync_core::domain::{Change, SyncStateKey, SyncToken};
use skillsync_core::ports::{ApplyStats, ListRequest};
use tracing::{debug, info, warn};

use super::{load_cursor, outcome_for, Budget, PassOptions, PassOutcome, PassReport, SyncMode};
use crate::context::SyncContext;
use crate::SyncError;

/// `target` of calendar list pass reports
pub const CALENDAR_LIST_TARGET: &str = "calendarList";

/// Vendor maximum for `calendarList.list`
const MAX_PAGE_SIZE: u32 = 250;

pub struct CalendarListReconciler<'a> {
    ctx: &'a SyncContext,
}

impl<'a> CalendarListReconciler<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(skip(self, options))]
    pub async fn reconcile(&self, options: &PassOptions) -> PassReport {
        let settings = &self.ctx.settings;
        let budget = Budget::new(settings.max_pages_per_pass, settings.time_budget)
            .capped_at(options.deadline);
        let key = SyncStateKey::CALENDAR_LIST_SYNC_TOKEN;

        let mut cursor = None;
        if !options.force_full {
            match load_cursor(self.ctx.store.as_ref(), key).await {
                Ok(stored) => cursor = stored,
                Err(e) => {
                    let mut report = PassReport::new(CALENDAR_LIST_TARGET, SyncMode::Full);
                    report.outcome = outcome_for(&SyncError::Store(e));
                    return report;
                }
            }
        }
        let mode = if cursor.is_some() {
            SyncMode::Incremental
        } else {
            SyncMode::Full
        };
        let mut report = PassReport::new(CALENDAR_LIST_TARGET, mode);

        loop {
            match self.run_pages(cursor.clone(), &budget, &mut report).await {
                Ok(outcome) => {
                    report.outcome = outcome;
                    break;
                }
                Err(SyncError::Remote(e)) if e.is_cursor_invalid() => {
                    if let Err(clear_err) = self.ctx.store.delete_state(key).await {
                        report.outcome = outcome_for(&SyncError::Store(clear_err));
                        break;
                    }
                    if report.mode == SyncMode::Incremental && !report.full_resync {
                        warn!(error = %e, "Calendar list sync token rejected, retrying in full mode");
                        report.mode = SyncMode::Full;
                        report.full_resync = true;
                        cursor = None;
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

        match &report.outcome {
            PassOutcome::Failed(error) => warn!(%error, "Calendar list pass failed"),
            outcome => info!(
                outcome = ?outcome,
                pages = report.pages,
                upserted = report.stats.upserted,
                removed = report.stats.deleted,
                "Calendar list pass finished"
            ),
        }
        report
    }

    async fn run_pages(
        &self,
        cursor: Option<SyncToken>,
        budget: &Budget,
        report: &mut PassReport,
    ) -> Result<PassOutcome, SyncError> {
        let store = &self.ctx.store;
        let page_size = self.ctx.settings.calendar_page_size.min(MAX_PAGE_SIZE);
        let mut request = ListRequest::new(page_size);
        if let Some(token) = cursor {
            request = request.with_sync_token(token);
        }

        let mut pages: u32 = 0;
        loop {
            let page = self.ctx.calendar.list_calendars(&request).await?;
            pages += 1;
            report.pages += 1;

            let mut stats = ApplyStats::default();
            let mut upserts = Vec::new();
            for change in page.items {
                match change {
                    Change::Upsert(collection) => upserts.push(collection),
                    Change::Removed { id, .. } => {
                        let Ok(id) = id.parse() else {
                            continue;
                        };
                        if store.mark_collection_removed(&id).await? {
                            stats.deleted += 1;
                        }
                    }
                }
            }
            if !upserts.is_empty() {
                store.upsert_collections(&upserts).await?;
                stats.upserted += upserts.len() as u64;
            }
            report.stats.merge(stats);

            if let Some(token) = &page.next_sync_token {
                store
                    .set_state(SyncStateKey::CALENDAR_LIST_SYNC_TOKEN, token.as_str())
                    .await?;
            }
            debug!(
                page = pages,
                upserted = stats.upserted,
                removed = stats.deleted,
                "Applied calendar list page"
            );

            let Some(next) = page.next_page_token else {
                return Ok(PassOutcome::Completed);
            };
            if let Some(reason) = budget.exceeded(pages) {
                info!(pages, reason = ?reason, "Calendar list pass truncated");
                return Ok(PassOutcome::Truncated(reason));
            }
            request.page_token = Some(next);
        }
    }
}
