//! Status publication port
//!
//! The orchestrator writes a snapshot after every run, whatever the
//! outcome. Sinks are write-only from the engine's point of view.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::local_store::StoreTotals;

/// Flat status record consumed by UIs and monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub connected: bool,
    pub sync_in_progress: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_sync_duration_ms: Option<u64>,
    pub last_sync_error: Option<String>,
    /// Collections reconciled by the last run
    pub last_sync_collections: usize,
    #[serde(flatten)]
    pub totals: StoreTotals,
    pub rate_limit_remaining: Option<u64>,
    pub rate_limit_reset: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Key/value view with keys in stable order
    pub fn to_flat_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

pub trait IStatusSink: Send + Sync {
    fn publish(&self, snapshot: &StatusSnapshot) -> Result<()>;
}
