//! Shared types for remote (vendor API) ports
//!
//! ## Design Notes
//!
//! - Remote calls return `Result<T, RemoteError>` rather than `anyhow::Result`
//!   because reconcilers branch on the failure class: a rejected cursor, a
//!   missing collection and a generic failure are each handled differently.
//! - [`RateLimitState`] is owned by whoever wires the process together and
//!   shared by reference with the HTTP adapter (writer) and the orchestrator
//!   (reader), so tests get independent instances.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::SyncToken;

// ============================================================================
// RemoteError
// ============================================================================

/// Classified failure of a single remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// No stored credential
    #[error("Not connected: no stored credential")]
    NotConnected,

    /// Credential rejected by the vendor (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Incremental cursor no longer accepted; a full resync is required
    #[error("Sync cursor rejected: {0}")]
    CursorInvalid(String),

    /// Collection or item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Endpoint not supported for this collection
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Throttled after exhausting retries
    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited {
        /// Seconds suggested by `Retry-After`, if sent
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code
        status: u16,
        /// Vendor error message, or the status reason
        message: String,
    },

    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Adapter misconfiguration (bad base URL, unbuildable request)
    #[error("Adapter misconfigured: {0}")]
    Config(String),
}

impl RemoteError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::NotConnected => "not_connected",
            RemoteError::Unauthorized(_) => "unauthorized",
            RemoteError::CursorInvalid(_) => "cursor_invalid",
            RemoteError::NotFound(_) => "not_found",
            RemoteError::Unsupported(_) => "unsupported",
            RemoteError::RateLimited { .. } => "rate_limited",
            RemoteError::Http { .. } => "http_error",
            RemoteError::Network(_) => "network_error",
            RemoteError::InvalidResponse(_) => "invalid_response",
            RemoteError::Config(_) => "config_error",
        }
    }

    pub fn is_cursor_invalid(&self) -> bool {
        matches!(self, RemoteError::CursorInvalid(_))
    }

    /// The collection cannot be listed at all; skip it without failing the run
    pub fn is_not_found_or_unsupported(&self) -> bool {
        matches!(self, RemoteError::NotFound(_) | RemoteError::Unsupported(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::NotConnected | RemoteError::Unauthorized(_))
    }

    /// Adapter-internal fault as opposed to an ordinary remote failure
    pub fn is_internal(&self) -> bool {
        matches!(self, RemoteError::Config(_))
    }
}

// ============================================================================
// Listing request / response
// ============================================================================

/// Request shape shared by every listing endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    pub page_size: u32,
    pub page_token: Option<String>,
    /// Incremental cursor; mutually exclusive with `time_min`
    pub sync_token: Option<SyncToken>,
    /// Lower bound of a full-mode listing
    pub time_min: Option<DateTime<Utc>>,
    pub order_by: Option<String>,
    /// Ask for deleted entries (needed to observe removals)
    pub show_deleted: bool,
}

impl ListRequest {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }

    pub fn with_sync_token(mut self, token: SyncToken) -> Self {
        self.sync_token = Some(token);
        self.show_deleted = true;
        self
    }

    pub fn with_time_min(mut self, time_min: DateTime<Utc>) -> Self {
        self.time_min = Some(time_min);
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// True if this request continues from an incremental cursor
    pub fn is_incremental(&self) -> bool {
        self.sync_token.is_some()
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    /// New cursor; vendors only send it on the last page
    pub next_sync_token: Option<SyncToken>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
            next_sync_token: None,
        }
    }

    pub fn with_next_page(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    pub fn with_sync_token(mut self, token: SyncToken) -> Self {
        self.next_sync_token = Some(token);
        self
    }

    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

// ============================================================================
// Rate-limit state
// ============================================================================

/// Point-in-time copy of [`RateLimitState`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    /// Last `X-RateLimit-Remaining` value seen
    pub remaining: Option<u64>,
    /// Last `X-RateLimit-Reset` value seen
    pub reset_at: Option<DateTime<Utc>>,
    /// Number of 429 responses received
    pub throttled: u64,
    pub last_retry_after_secs: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Rate-limit counters shared between the HTTP adapter and the orchestrator
#[derive(Debug, Default)]
pub struct RateLimitState {
    inner: Mutex<RateLimitSnapshot>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records quota headers; absent values keep the previous reading
    pub fn record_headers(&self, remaining: Option<u64>, reset_at: Option<DateTime<Utc>>) {
        if remaining.is_none() && reset_at.is_none() {
            return;
        }
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if remaining.is_some() {
            guard.remaining = remaining;
        }
        if reset_at.is_some() {
            guard.reset_at = reset_at;
        }
        guard.updated_at = Some(Utc::now());
    }

    /// Records a 429 response
    pub fn record_throttle(&self, retry_after_secs: Option<u64>) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.throttled += 1;
        guard.last_retry_after_secs = retry_after_secs;
        guard.updated_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
