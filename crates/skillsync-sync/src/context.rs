//! Shared collaborators and tunables for sync passes

use std::sync::Arc;
use std::time::Duration;

use skillsync_core::config::Config;
use skillsync_core::ports::{ICalendarApi, ICredentialProvider, IDriveApi, ILocalStore};
use tracing::warn;

/// Tunables derived from [`Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub calendar_enabled: bool,
    pub calendar_page_size: u32,
    pub drive_enabled: bool,
    pub drive_page_size: u32,
    /// Spreadsheet/document detail fetches per Drive pass
    pub max_content_fetches: u32,
    pub max_pages_per_pass: u32,
    /// Wall-clock budget of one run; every pass in it shares the deadline
    pub time_budget: Duration,
    /// Retrospective window of a full-mode listing
    pub full_sync_window: chrono::Duration,
    pub retention: chrono::Duration,
    pub staleness: chrono::Duration,
    /// K: collections reconciled per run
    pub max_collections_per_run: usize,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            calendar_enabled: config.calendar.enabled,
            calendar_page_size: config.calendar.page_size,
            drive_enabled: config.drive.enabled,
            drive_page_size: config.drive.page_size,
            max_content_fetches: config.drive.max_content_fetches,
            max_pages_per_pass: config.sync.max_pages_per_pass,
            time_budget: Duration::from_secs(config.sync.time_budget_secs),
            full_sync_window: chrono::Duration::days(i64::from(config.sync.full_sync_window_days)),
            retention: chrono::Duration::days(i64::from(config.sync.retention_days)),
            staleness: chrono::Duration::hours(config.sync.staleness_hours as i64),
            max_collections_per_run: config.sync.max_collections_per_run,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a pass needs, passed by reference instead of living in globals
pub struct SyncContext {
    pub store: Arc<dyn ILocalStore>,
    pub calendar: Arc<dyn ICalendarApi>,
    pub drive: Arc<dyn IDriveApi>,
    pub credentials: Arc<dyn ICredentialProvider>,
    pub settings: SyncSettings,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn ILocalStore>,
        calendar: Arc<dyn ICalendarApi>,
        drive: Arc<dyn IDriveApi>,
        credentials: Arc<dyn ICredentialProvider>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            calendar,
            drive,
            credentials,
            settings,
        }
    }

    /// Whether a credential is stored; lookup failures count as "no"
    pub async fn is_connected(&self) -> bool {
        match self.credentials.get_credential().await {
            Ok(credential) => credential.is_some(),
            Err(e) => {
                warn!(error = %e, "Credential lookup failed");
                false
            }
        }
    }
}
