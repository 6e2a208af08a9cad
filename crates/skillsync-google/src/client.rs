//! Authenticated HTTP client for Google APIs
//!
//! One [`ApiClient`] talks to one API base URL (Calendar, Drive, ...) and
//! turns every call into a `Result<T, RemoteError>`:
//!
//! - the bearer credential is looked up per call; no credential means
//!   `RemoteError::NotConnected`, never a panic or a transport error
//! - 429 responses (and 403 responses whose reason is a rate-limit reason)
//!   are retried up to `max_retries` times, honoring `Retry-After`, as
//!   long as the total wait stays within `max_retry_wait`; a longer wait
//!   is returned as `RemoteError::RateLimited` for the caller's budget
//! - any other non-success status is classified from the vendor's error
//!   body so callers can tell a rejected sync token from a missing calendar
//! - quota headers of every response are copied into the shared
//!   [`RateLimitState`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reqwest::Method;
//! use skillsync_google::{ApiClient, FetchOptions, StaticCredentialProvider};
//!
//! # async fn example() -> Result<(), skillsync_core::ports::RemoteError> {
//! let credentials = Arc::new(StaticCredentialProvider::new("ya29.token"));
//! let client = ApiClient::new("https://www.googleapis.com/calendar/v3", credentials);
//! let list: serde_json::Value = client
//!     .fetch(Method::GET, "/users/me/calendarList", FetchOptions::new().query("maxResults", 10))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use skillsync_core::config::ApiConfig;
use skillsync_core::ports::{ICredentialProvider, RateLimitState, RemoteError};
use tracing::{debug, info, warn};
use url::Url;

use crate::rate_limit::{header_str, parse_retry_after, record_response_headers, RETRY_AFTER_HEADER};

/// Wait used when a 429 carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Total backoff one call may sleep through before giving up
const DEFAULT_MAX_RETRY_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// FetchOptions
// ============================================================================

/// Optional parts of a single call
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Replaces the client's base URL for this call only
    pub base_url: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Adds a query parameter only when `value` is present
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

// ============================================================================
// Vendor error body
// ============================================================================

/// `{"error": {"code": 404, "message": "...", "errors": [{"reason": "notFound"}]}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// Classifies a non-success response
pub(crate) fn classify_error(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> RemoteError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);
    let reason = parsed
        .as_ref()
        .and_then(|b| b.errors.iter().find_map(|d| d.reason.clone()));
    let message = parsed
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    match (status.as_u16(), reason.as_deref()) {
        (429, _) | (403, Some("rateLimitExceeded" | "userRateLimitExceeded")) => {
            RemoteError::RateLimited {
                retry_after_secs: retry_after.map(|d| d.as_secs()),
            }
        }
        (401, _) => RemoteError::Unauthorized(message),
        (410, _) | (_, Some("fullSyncRequired")) => RemoteError::CursorInvalid(message),
        (_, Some("notSupported" | "notACalendarUser")) => RemoteError::Unsupported(message),
        (404, _) => RemoteError::NotFound(message),
        (code, _) => RemoteError::Http {
            status: code,
            message,
        },
    }
}

/// A listing that names a `pageToken` in its 400 rejected the resume point
pub(crate) fn map_page_token_error(error: RemoteError) -> RemoteError {
    match error {
        RemoteError::Http {
            status: 400,
            message,
        } if message.contains("pageToken") => RemoteError::CursorInvalid(message),
        other => other,
    }
}

/// `{success: false, error: {code, message}}` for an ordinary failure
pub fn error_envelope(error: &RemoteError) -> Value {
    json!({
        "success": false,
        "error": { "code": error.code(), "message": error.to_string() },
    })
}

// ============================================================================
// ApiClient
// ============================================================================

/// HTTP client bound to one Google API base URL
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn ICredentialProvider>,
    rate_limit: Arc<RateLimitState>,
    max_retries: u32,
    max_retry_wait: Duration,
}

impl ApiClient {
    /// Creates a client with default timeouts and a private rate-limit state
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn ICredentialProvider>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            credentials,
            rate_limit: Arc::new(RateLimitState::new()),
            max_retries: DEFAULT_MAX_RETRIES,
            max_retry_wait: DEFAULT_MAX_RETRY_WAIT,
        }
    }

    /// Creates a client using the timeout and retry settings of `api`
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Config` if the base URL does not parse or the
    /// HTTP client cannot be built.
    pub fn from_config(
        base_url: impl Into<String>,
        api: &ApiConfig,
        credentials: Arc<dyn ICredentialProvider>,
        rate_limit: Arc<RateLimitState>,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into();
        Url::parse(&base_url)
            .map_err(|e| RemoteError::Config(format!("invalid base URL {}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(api.request_timeout_secs))
            .build()
            .map_err(|e| RemoteError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            credentials,
            rate_limit,
            max_retries: api.max_retries,
            max_retry_wait: Duration::from_secs(api.max_retry_wait_secs),
        })
    }

    /// Shares `state` with other clients and the orchestrator
    pub fn with_rate_limit_state(mut self, state: Arc<RateLimitState>) -> Self {
        self.rate_limit = state;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Caps the total time one call sleeps on 429 backoff
    pub fn with_max_retry_wait(mut self, max_retry_wait: Duration) -> Self {
        self.max_retry_wait = max_retry_wait;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn rate_limit_state(&self) -> &Arc<RateLimitState> {
        &self.rate_limit
    }

    /// Joins a base URL (the override, or the client's own) with `path`
    pub fn url(&self, base_override: Option<&str>, path: &str) -> Result<Url, RemoteError> {
        let base = base_override.unwrap_or(&self.base_url);
        let full = format!("{}{}", base.trim_end_matches('/'), path);
        Url::parse(&full).map_err(|e| RemoteError::Config(format!("invalid URL {}: {}", full, e)))
    }

    /// Performs one call and decodes the JSON response body
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: FetchOptions,
    ) -> Result<T, RemoteError> {
        let response = self.send(method, path, &options).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Performs one call whose response has no body (e.g. DELETE)
    pub async fn fetch_empty(
        &self,
        method: Method,
        path: &str,
        options: FetchOptions,
    ) -> Result<(), RemoteError> {
        self.send(method, path, &options).await.map(|_| ())
    }

    /// Performs one call and wraps the outcome in a JSON envelope
    ///
    /// Ordinary failures (auth, 4xx/5xx, network) become
    /// `{success: false, error: {code, message}}`. Only adapter faults such
    /// as an unparseable base URL are returned as `Err`.
    pub async fn fetch_envelope(
        &self,
        method: Method,
        path: &str,
        options: FetchOptions,
    ) -> Result<Value, RemoteError> {
        match self.fetch::<Value>(method, path, options).await {
            Ok(data) => Ok(json!({ "success": true, "data": data })),
            Err(e) if e.is_internal() => Err(e),
            Err(e) => Ok(error_envelope(&e)),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        options: &FetchOptions,
    ) -> Result<Response, RemoteError> {
        let credential = match self.credentials.get_credential().await {
            Ok(Some(credential)) => credential,
            Ok(None) => return Err(RemoteError::NotConnected),
            Err(e) => {
                warn!(error = %e, "Credential lookup failed");
                return Err(RemoteError::NotConnected);
            }
        };
        if credential.is_expired(Utc::now()) {
            return Err(RemoteError::Unauthorized(
                "stored credential has expired".to_string(),
            ));
        }

        let url = self.url(options.base_url.as_deref(), path)?;

        let mut attempt: u32 = 0;
        let mut waited = Duration::ZERO;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&credential.access_token);
            if !options.query.is_empty() {
                request = request.query(&options.query);
            }
            for (name, value) in &options.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &options.body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_builder() {
                    RemoteError::Config(e.to_string())
                } else {
                    RemoteError::Network(e.to_string())
                }
            })?;

            record_response_headers(&self.rate_limit, response.headers());
            let status = response.status();
            if status.is_success() {
                debug!(%method, path, status = status.as_u16(), "Request succeeded");
                return Ok(response);
            }

            let retry_after = header_str(response.headers(), RETRY_AFTER_HEADER)
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER));
            let body = response.text().await.unwrap_or_default();
            let error = classify_error(status, &body, retry_after);

            if let RemoteError::RateLimited { retry_after_secs } = &error {
                self.rate_limit.record_throttle(*retry_after_secs);
                let wait = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                if attempt < self.max_retries && waited + wait <= self.max_retry_wait {
                    info!(
                        path,
                        attempt,
                        retry_after_ms = wait.as_millis() as u64,
                        "Received 429, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    waited += wait;
                    attempt += 1;
                    continue;
                }
                warn!(
                    path,
                    attempts = attempt + 1,
                    retry_after_ms = wait.as_millis() as u64,
                    "Rate limited, not retrying"
                );
            } else {
                debug!(
                    %method,
                    path,
                    status = status.as_u16(),
                    code = error.code(),
                    "Request failed"
                );
            }
            return Err(error);
        }
    }
}

/// Percent-encodes one URL path segment (calendar ids contain `@` and `#`)
pub(crate) fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
