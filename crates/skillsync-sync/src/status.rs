//! Status sinks
//!
//! [`IStatusSink`] implementations the orchestrator publishes to after
//! every run.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use skillsync_core::ports::{IStatusSink, StatusSnapshot};
use tracing::{debug, info};

/// Logs each snapshot as one structured event
#[derive(Debug, Default)]
pub struct TracingStatusSink;

impl IStatusSink for TracingStatusSink {
    fn publish(&self, snapshot: &StatusSnapshot) -> anyhow::Result<()> {
        info!(
            connected = snapshot.connected,
            in_progress = snapshot.sync_in_progress,
            last_sync_time = ?snapshot.last_sync_time,
            last_sync_duration_ms = ?snapshot.last_sync_duration_ms,
            last_sync_error = snapshot.last_sync_error.as_deref().unwrap_or(""),
            collections = snapshot.last_sync_collections,
            events = snapshot.totals.events,
            files = snapshot.totals.files,
            rate_limit_remaining = ?snapshot.rate_limit_remaining,
            "Sync status"
        );
        Ok(())
    }
}

/// Keeps the latest snapshot in memory for in-process readers
#[derive(Debug, Default)]
pub struct SharedStatusSink {
    latest: RwLock<Option<StatusSnapshot>>,
}

impl SharedStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl IStatusSink for SharedStatusSink {
    fn publish(&self, snapshot: &StatusSnapshot) -> anyhow::Result<()> {
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }
}

/// Writes the flat key/value view of each snapshot to a JSON file
///
/// The file is replaced atomically: written next to the target, then
/// renamed over it.
#[derive(Debug, Clone)]
pub struct JsonFileStatusSink {
    path: PathBuf,
}

impl JsonFileStatusSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IStatusSink for JsonFileStatusSink {
    fn publish(&self, snapshot: &StatusSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp_path = {
            let mut p = self.path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };
        let body = serde_json::to_vec_pretty(&snapshot.to_flat_map())?;
        std::fs::write(&tmp_path, body)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Status file written");
        Ok(())
    }
}
