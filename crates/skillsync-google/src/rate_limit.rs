//! Rate-limit header handling
//!
//! Google APIs throttle with HTTP 429 and an optional `Retry-After` header.
//! Some proxies in front of them also report quota through
//! `X-RateLimit-Remaining` / `X-RateLimit-Reset`; when present those values
//! are copied into the shared [`RateLimitState`] so the status sink can
//! publish them.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use skillsync_core::ports::RateLimitState;
use tracing::warn;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Longest wait a `Retry-After` value is taken at
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Parses a `Retry-After` header value
///
/// Accepts either integer seconds or an RFC 2822 HTTP-date. Integers are
/// clamped to an hour. Dates further than an hour away, dates in the past
/// and garbage fall back to `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds.min(MAX_RETRY_AFTER_SECS));
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let target = date.with_timezone(&Utc);
        let now = Utc::now();
        if target > now {
            let secs = (target - now).num_seconds();
            if let Ok(secs) = u64::try_from(secs) {
                if secs <= MAX_RETRY_AFTER_SECS {
                    return Duration::from_secs(secs);
                }
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

/// Parses an `X-RateLimit-Reset` value
///
/// Integers are Unix epoch seconds; anything else must be RFC 3339.
pub fn parse_reset(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(epoch) = value.parse::<i64>() {
        return Utc.timestamp_opt(epoch, 0).single();
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Copies quota headers from a response into `state`
pub fn record_response_headers(state: &RateLimitState, headers: &HeaderMap) {
    let remaining = header_str(headers, REMAINING_HEADER).and_then(|v| v.trim().parse::<u64>().ok());
    let reset_at = header_str(headers, RESET_HEADER).and_then(parse_reset);
    state.record_headers(remaining, reset_at);
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
