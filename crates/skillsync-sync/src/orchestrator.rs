//! Sync orchestrator
//!
//! The [`SyncOrchestrator`] is the entry point of a sync run. It decides
//! which collections need reconciliation and runs their passes one after
//! another under a shared wall-clock deadline.
//!
//! ## Run Flow
//!
//! ```text
//! Idle ──try_begin──→ Running ──RunGuard dropped──→ Idle
//!                        │
//!     status sinks → calendar list → K stalest calendars → drive
//!         → lastSyncRun → status sinks
//! ```
//!
//! A run requested while another is active returns
//! [`RunStatus::AlreadyRunning`] without fetching anything. The guard lives
//! in [`SyncRuntime`], which is injected so tests can use isolated instances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use skillsync_core::domain::{CollectionId, CollectionKind, RunSummary, SyncStateKey};
use skillsync_core::ports::{IStatusSink, RateLimitState, StatusSnapshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::SyncContext;
use crate::reconciler::{
    load_meta, read_json, write_json, CalendarListReconciler, DriveReconciler, EventReconciler,
    PassOptions, PassReport,
};

// ============================================================================
// Runtime state
// ============================================================================

/// Process-wide mutable state shared by the orchestrator and adapters
#[derive(Debug, Default)]
pub struct SyncRuntime {
    in_progress: AtomicBool,
    rate_limit: Arc<RateLimitState>,
}

impl SyncRuntime {
    pub fn new(rate_limit: Arc<RateLimitState>) -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            rate_limit,
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Marks a run as active; `None` if one already is
    pub fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: &self.in_progress,
            })
    }

    pub fn rate_limit(&self) -> &Arc<RateLimitState> {
        &self.rate_limit
    }
}

/// Clears the in-progress flag when dropped, including on panic
pub struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Requests and reports
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Reconcile only this collection (`drive` for the Drive tree)
    pub collection: Option<CollectionId>,
    /// Ignore staleness and take the K oldest collections anyway
    pub force: bool,
    /// Ignore stored cursors and relist the full window
    pub full: bool,
}

impl RunRequest {
    pub fn periodic() -> Self {
        Self::default()
    }

    pub fn for_collection(id: CollectionId) -> Self {
        Self {
            collection: Some(id),
            ..Default::default()
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn full(mut self) -> Self {
        self.full = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Another run held the guard; nothing was fetched
    AlreadyRunning,
    NotConnected,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub calendar_list: Option<PassReport>,
    /// Calendar and Drive passes in execution order
    pub passes: Vec<PassReport>,
    /// Failures of individual passes, or of the run itself
    pub error: Option<String>,
}

impl RunReport {
    fn new(status: RunStatus) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            status,
            calendar_list: None,
            passes: Vec::new(),
            error: None,
        }
    }

    /// Passes that applied their pages cleanly (completed or truncated)
    pub fn collections_synced(&self) -> usize {
        self.passes
            .iter()
            .filter(|p| p.outcome.made_progress())
            .count()
    }

    pub fn items_applied(&self) -> u64 {
        self.calendar_list
            .iter()
            .chain(self.passes.iter())
            .map(|p| p.stats.applied())
            .sum()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    pub fn to_summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms(),
            collections_synced: self.collections_synced(),
            items_applied: self.items_applied(),
            error: self.error.clone(),
        }
    }

    fn record_failure(&mut self, pass: &PassReport) {
        if let Some(message) = pass.outcome.error_message() {
            self.push_error(format!("{}: {}", pass.target, message));
        }
    }

    fn push_error(&mut self, message: String) {
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{existing}; {message}"),
            None => message,
        });
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

pub struct SyncOrchestrator {
    ctx: Arc<SyncContext>,
    runtime: Arc<SyncRuntime>,
    sinks: Vec<Arc<dyn IStatusSink>>,
}

impl SyncOrchestrator {
    pub fn new(ctx: Arc<SyncContext>, runtime: Arc<SyncRuntime>) -> Self {
        Self {
            ctx,
            runtime,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn IStatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    pub fn runtime(&self) -> &Arc<SyncRuntime> {
        &self.runtime
    }

    /// Runs one sync cycle; never fails, outcomes are in the report
    pub async fn run(&self, request: RunRequest) -> RunReport {
        let Some(guard) = self.runtime.try_begin() else {
            info!("Sync already in progress, dropping request");
            return RunReport::new(RunStatus::AlreadyRunning);
        };

        let report = if self.ctx.is_connected().await {
            let mut report = RunReport::new(RunStatus::Completed);
            info!(run_id = %report.run_id, "Starting sync run");
            self.publish_status().await;
            if let Err(e) = self.run_inner(&request, &mut report).await {
                warn!(error = %format!("{e:#}"), "Sync run aborted");
                report.push_error(format!("{e:#}"));
            }
            report.finished_at = Utc::now();

            if let Err(e) = write_json(
                self.ctx.store.as_ref(),
                SyncStateKey::LAST_SYNC_RUN,
                &report.to_summary(),
            )
            .await
            {
                warn!(error = %format!("{e:#}"), "Failed to persist run summary");
            }
            info!(
                run_id = %report.run_id,
                collections = report.collections_synced(),
                items = report.items_applied(),
                duration_ms = report.duration_ms(),
                error = report.error.as_deref().unwrap_or(""),
                "Sync run finished"
            );
            report
        } else {
            debug!("No credential stored, skipping sync");
            RunReport::new(RunStatus::NotConnected)
        };

        // Released first so the final snapshot reports the run as finished
        drop(guard);
        self.publish_status().await;
        report
    }

    async fn run_inner(&self, request: &RunRequest, report: &mut RunReport) -> anyhow::Result<()> {
        let settings = &self.ctx.settings;
        let deadline = Instant::now() + settings.time_budget;
        let options = PassOptions {
            force_full: request.full,
            deadline: Some(deadline),
            ..Default::default()
        };

        let drive_only = request
            .collection
            .as_ref()
            .is_some_and(|id| id.as_str() == CollectionId::DRIVE);

        if settings.calendar_enabled && !drive_only {
            let list_pass = CalendarListReconciler::new(&self.ctx)
                .reconcile(&options)
                .await;
            report.record_failure(&list_pass);
            report.calendar_list = Some(list_pass);

            let targets = match &request.collection {
                Some(id) => vec![id.clone()],
                None => self.select_calendars(request.force).await?,
            };
            debug!(count = targets.len(), "Selected calendars");

            for (index, calendar_id) in targets.iter().enumerate() {
                if Instant::now() >= deadline {
                    info!(
                        deferred = targets.len() - index,
                        "Run time budget exhausted, deferring remaining calendars"
                    );
                    break;
                }
                let pass = EventReconciler::new(&self.ctx)
                    .reconcile(calendar_id, &options)
                    .await;
                report.record_failure(&pass);
                report.passes.push(pass);
            }
        }

        let drive_requested = request.collection.is_none() || drive_only;
        if settings.drive_enabled && drive_requested {
            if Instant::now() >= deadline {
                info!("Run time budget exhausted, deferring drive");
            } else if drive_only || request.force || self.drive_is_stale().await? {
                let pass = DriveReconciler::new(&self.ctx).reconcile(&options).await;
                report.record_failure(&pass);
                report.passes.push(pass);
            }
        }
        Ok(())
    }

    /// Up to K syncable calendars, never-synced first, then oldest watermark
    async fn select_calendars(&self, force: bool) -> anyhow::Result<Vec<CollectionId>> {
        let store = self.ctx.store.as_ref();
        let settings = &self.ctx.settings;
        let now = Utc::now();

        let mut candidates = Vec::new();
        for collection in store.list_collections().await? {
            if collection.kind != CollectionKind::Calendar || !collection.is_syncable() {
                continue;
            }
            let meta = load_meta(store, &collection.id).await?;
            if force || meta.is_stale(now, settings.staleness) {
                candidates.push((meta.last_full_sync, collection.id));
            }
        }
        // None sorts before Some, so never-synced calendars come first
        candidates.sort();
        Ok(candidates
            .into_iter()
            .take(settings.max_collections_per_run)
            .map(|(_, id)| id)
            .collect())
    }

    async fn drive_is_stale(&self) -> anyhow::Result<bool> {
        let meta = load_meta(self.ctx.store.as_ref(), &CollectionId::drive()).await?;
        Ok(meta.is_stale(Utc::now(), self.ctx.settings.staleness))
    }

    /// Current status, as published to sinks when a run starts and ends
    pub async fn status(&self) -> StatusSnapshot {
        let store = self.ctx.store.as_ref();
        let last_run: Option<RunSummary> = read_json(store, SyncStateKey::LAST_SYNC_RUN)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %format!("{e:#}"), "Failed to read last run summary");
                None
            });
        let totals = store.totals().await.unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "Failed to count cached rows");
            Default::default()
        });
        let rate_limit = self.runtime.rate_limit().snapshot();

        StatusSnapshot {
            connected: self.ctx.is_connected().await,
            sync_in_progress: self.runtime.is_running(),
            last_sync_time: last_run.as_ref().map(|r| r.finished_at),
            last_sync_duration_ms: last_run.as_ref().map(|r| r.duration_ms),
            last_sync_error: last_run.as_ref().and_then(|r| r.error.clone()),
            last_sync_collections: last_run.map(|r| r.collections_synced).unwrap_or(0),
            totals,
            rate_limit_remaining: rate_limit.remaining,
            rate_limit_reset: rate_limit.reset_at,
        }
    }

    async fn publish_status(&self) {
        if self.sinks.is_empty() {
            return;
        }
        let snapshot = self.status().await;
        let sinks = self.sinks.clone();
        // Sinks may touch the filesystem
        let published = tokio::task::spawn_blocking(move || {
            for sink in &sinks {
                if let Err(e) = sink.publish(&snapshot) {
                    warn!(error = %format!("{e:#}"), "Status sink failed");
                }
            }
        })
        .await;
        if let Err(e) = published {
            warn!(error = %e, "Status publication task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{PassOutcome, SyncMode};
    use skillsync_core::ports::ApplyStats;

    #[test]
    fn test_guard_is_exclusive_and_released_on_drop() {
        let runtime = SyncRuntime::default();
        let guard = runtime.try_begin();
        assert!(guard.is_some());
        assert!(runtime.is_running());
        assert!(runtime.try_begin().is_none());

        drop(guard);
        assert!(!runtime.is_running());
        assert!(runtime.try_begin().is_some());
    }

    #[test]
    fn test_report_counts_and_errors() {
        let mut report = RunReport::new(RunStatus::Completed);

        let mut ok = PassReport::new("a", SyncMode::Full);
        ok.stats = ApplyStats {
            upserted: 10,
            skipped_stale: 2,
            deleted: 1,
        };
        let mut failed = PassReport::new("b", SyncMode::Incremental);
        failed.outcome = PassOutcome::Failed("HTTP 500: backend".into());
        let mut skipped = PassReport::new("c", SyncMode::Full);
        skipped.outcome = PassOutcome::Skipped("not found".into());

        for pass in [ok, failed, skipped] {
            report.record_failure(&pass);
            report.passes.push(pass);
        }

        assert_eq!(report.collections_synced(), 1);
        assert_eq!(report.items_applied(), 11);
        assert_eq!(report.error.as_deref(), Some("b: HTTP 500: backend"));

        let summary = report.to_summary();
        assert_eq!(summary.collections_synced, 1);
        assert_eq!(summary.run_id, report.run_id);
    }
}
