//! Configuration module for skillsync.
//!
//! One YAML file drives the reconcile budgets, vendor endpoints, cache
//! location, logging and credential lookup. Every section has defaults, and
//! `validate()` reports all problems at once.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for skillsync.
///
/// Missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub calendar: CalendarConfig,
    pub drive: DriveConfig,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

/// Scheduling and budget settings shared by every reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minutes between periodic runs.
    pub poll_interval_minutes: u64,
    /// A collection whose watermark is older than this is due for sync.
    pub staleness_hours: u64,
    /// Maximum collections reconciled per run (K).
    pub max_collections_per_run: usize,
    /// Maximum listing pages fetched per collection pass.
    pub max_pages_per_pass: u32,
    /// Wall-clock budget per run, in seconds. Keep well below any outer timeout.
    pub time_budget_secs: u64,
    /// Retrospective window of a full resync, in days.
    pub full_sync_window_days: u32,
    /// Items older than this are pruned after a completed pass, in days.
    pub retention_days: u32,
}

/// Calendar reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub enabled: bool,
    /// Events per listing page (vendor maximum 2500).
    pub page_size: u32,
}

/// Drive reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub enabled: bool,
    /// Files per listing page (vendor maximum 1000).
    pub page_size: u32,
    /// Maximum spreadsheet/document detail fetches per run.
    pub max_content_fetches: u32,
}

/// Vendor endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub calendar_base_url: String,
    pub drive_base_url: String,
    pub sheets_base_url: String,
    pub docs_base_url: String,
    /// Retries on HTTP 429 before giving up.
    pub max_retries: u32,
    /// Total 429 backoff one request may sleep through, in seconds.
    /// Longer waits surface as rate-limited errors. Must stay below `sync.time_budget_secs`.
    pub max_retry_wait_secs: u64,
    /// Per-request timeout, in seconds.
    pub request_timeout_secs: u64,
}

/// Local cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Credential lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Keyring account holding the stored credential. `None` disables keyring lookup.
    pub keyring_account: Option<String>,
    /// Environment variable checked for a bearer token before the keyring.
    pub access_token_env: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/skillsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("skillsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 30,
            staleness_hours: 6,
            max_collections_per_run: 5,
            max_pages_per_pass: 5,
            time_budget_secs: 25,
            full_sync_window_days: 30,
            retention_days: 90,
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: 250,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: 100,
            max_content_fetches: 20,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            calendar_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            drive_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            sheets_base_url: "https://sheets.googleapis.com/v4".to_string(),
            docs_base_url: "https://docs.googleapis.com/v1".to_string(),
            max_retries: 3,
            max_retry_wait_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("skillsync")
                .join("cache.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            keyring_account: None,
            access_token_env: "SKILLSYNC_ACCESS_TOKEN".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_pages_per_pass"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

fn in_range(errors: &mut Vec<ValidationError>, field: &str, value: u32, max: u32) {
    if value == 0 || value > max {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("must be in range 1..={}", max),
        });
    }
}

fn http_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("must be an http(s) URL, got '{}'", value),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        positive(&mut errors, "sync.poll_interval_minutes", self.sync.poll_interval_minutes);
        positive(&mut errors, "sync.staleness_hours", self.sync.staleness_hours);
        positive(
            &mut errors,
            "sync.max_collections_per_run",
            self.sync.max_collections_per_run as u64,
        );
        positive(
            &mut errors,
            "sync.max_pages_per_pass",
            u64::from(self.sync.max_pages_per_pass),
        );
        positive(&mut errors, "sync.time_budget_secs", self.sync.time_budget_secs);
        positive(
            &mut errors,
            "sync.full_sync_window_days",
            u64::from(self.sync.full_sync_window_days),
        );
        if self.sync.retention_days < self.sync.full_sync_window_days {
            errors.push(ValidationError {
                field: "sync.retention_days".into(),
                message: format!(
                    "retention_days ({}) must not be shorter than full_sync_window_days ({})",
                    self.sync.retention_days, self.sync.full_sync_window_days
                ),
            });
        }
        if self.sync.time_budget_secs >= self.sync.poll_interval_minutes.saturating_mul(60)
            && self.sync.poll_interval_minutes > 0
        {
            errors.push(ValidationError {
                field: "sync.time_budget_secs".into(),
                message: "must be shorter than the poll interval".into(),
            });
        }

        // --- calendar / drive ---
        in_range(&mut errors, "calendar.page_size", self.calendar.page_size, 2500);
        in_range(&mut errors, "drive.page_size", self.drive.page_size, 1000);

        // --- api ---
        http_url(&mut errors, "api.calendar_base_url", &self.api.calendar_base_url);
        http_url(&mut errors, "api.drive_base_url", &self.api.drive_base_url);
        http_url(&mut errors, "api.sheets_base_url", &self.api.sheets_base_url);
        http_url(&mut errors, "api.docs_base_url", &self.api.docs_base_url);
        if self.api.max_retries > 10 {
            errors.push(ValidationError {
                field: "api.max_retries".into(),
                message: "must not exceed 10".into(),
            });
        }
        positive(&mut errors, "api.request_timeout_secs", self.api.request_timeout_secs);
        if self.api.max_retry_wait_secs >= self.sync.time_budget_secs {
            errors.push(ValidationError {
                field: "api.max_retry_wait_secs".into(),
                message: "must be shorter than sync.time_budget_secs".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- auth ---
        if self.auth.access_token_env.is_empty() {
            errors.push(ValidationError {
                field: "auth.access_token_env".into(),
                message: "must not be empty".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use skillsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .max_pages_per_pass(10)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn poll_interval_minutes(mut self, minutes: u64) -> Self {
        self.config.sync.poll_interval_minutes = minutes;
        self
    }

    pub fn staleness_hours(mut self, hours: u64) -> Self {
        self.config.sync.staleness_hours = hours;
        self
    }

    pub fn max_collections_per_run(mut self, n: usize) -> Self {
        self.config.sync.max_collections_per_run = n;
        self
    }

    pub fn max_pages_per_pass(mut self, n: u32) -> Self {
        self.config.sync.max_pages_per_pass = n;
        self
    }

    pub fn time_budget_secs(mut self, seconds: u64) -> Self {
        self.config.sync.time_budget_secs = seconds;
        self
    }

    pub fn full_sync_window_days(mut self, days: u32) -> Self {
        self.config.sync.full_sync_window_days = days;
        self
    }

    pub fn retention_days(mut self, days: u32) -> Self {
        self.config.sync.retention_days = days;
        self
    }

    // --- calendar / drive ---

    pub fn calendar_enabled(mut self, enabled: bool) -> Self {
        self.config.calendar.enabled = enabled;
        self
    }

    pub fn calendar_page_size(mut self, n: u32) -> Self {
        self.config.calendar.page_size = n;
        self
    }

    pub fn drive_enabled(mut self, enabled: bool) -> Self {
        self.config.drive.enabled = enabled;
        self
    }

    pub fn drive_page_size(mut self, n: u32) -> Self {
        self.config.drive.page_size = n;
        self
    }

    pub fn drive_max_content_fetches(mut self, n: u32) -> Self {
        self.config.drive.max_content_fetches = n;
        self
    }

    // --- api ---

    /// Points every vendor endpoint at one base URL (mock servers)
    pub fn api_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.config.api.calendar_base_url = base_url.clone();
        self.config.api.drive_base_url = base_url.clone();
        self.config.api.sheets_base_url = base_url.clone();
        self.config.api.docs_base_url = base_url;
        self
    }

    pub fn api_max_retries(mut self, n: u32) -> Self {
        self.config.api.max_retries = n;
        self
    }

    pub fn api_max_retry_wait_secs(mut self, seconds: u64) -> Self {
        self.config.api.max_retry_wait_secs = seconds;
        self
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- auth ---

    pub fn keyring_account(mut self, account: impl Into<String>) -> Self {
        self.config.auth.keyring_account = Some(account.into());
        self
    }

    /// Consume the builder and return the [`Config`] (no validation).
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the [`Config`] or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
