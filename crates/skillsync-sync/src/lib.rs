//! skillsync Sync - Incremental synchronization engine
//!
//! Provides:
//! - Per-collection reconcilers (calendar list, calendar events, Drive)
//!   with sync-token resumption, page/time budgets and full-resync fallback
//! - A sync orchestrator with single-run mutual exclusion and
//!   staleness-based collection selection
//! - Query-time cache fill for ranged and point reads
//! - Query tools returning `{success, data | error}` JSON
//! - Status sinks
//!
//! ## Modules
//!
//! - [`context`] - Shared collaborators and tunables
//! - [`reconciler`] - Pagination, cursors, pruning
//! - [`orchestrator`] - Run guard, selection, status publication
//! - [`cache_fill`] - Serve from cache, reconcile on coverage gaps
//! - [`tools`] - JSON tool surface over cache fill and the orchestrator
//! - [`status`] - `IStatusSink` implementations

pub mod cache_fill;
pub mod context;
pub mod orchestrator;
pub mod reconciler;
pub mod status;
pub mod tools;

pub use cache_fill::{CacheFill, EventsRead};
pub use context::{SyncContext, SyncSettings};
pub use orchestrator::{RunReport, RunRequest, RunStatus, SyncOrchestrator, SyncRuntime};
pub use reconciler::{PassOptions, PassOutcome, PassReport, SyncMode, TruncationReason};
pub use status::{JsonFileStatusSink, SharedStatusSink, TracingStatusSink};
pub use tools::SkillTools;

use skillsync_core::domain::DomainError;
use skillsync_core::ports::RemoteError;
use thiserror::Error;

/// Errors that can occur during synchronization and cache reads
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote call failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The caller passed arguments that cannot be served
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requested entity does not exist locally or remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// A domain-level error propagated from skillsync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// A result could not be encoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The local store failed; the in-flight transaction was rolled back
    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),
}
