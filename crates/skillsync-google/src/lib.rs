//! skillsync Google - Vendor API adapters
//!
//! Provides async adapters for:
//! - Google Calendar (calendar list, events, event CRUD)
//! - Google Drive (file listing, change log, file metadata)
//! - Google Sheets and Docs (content of Drive-hosted documents)
//! - Credential lookup (static token, environment, OS keyring)
//!
//! ## Modules
//!
//! - [`client`] - Authenticated single-call HTTP client with 429 retry
//! - [`calendar`] - `ICalendarApi` implementation
//! - [`drive`] - `IDriveApi` implementation
//! - [`credentials`] - `ICredentialProvider` implementations
//! - [`rate_limit`] - Rate-limit header parsing

pub mod calendar;
pub mod client;
pub mod credentials;
pub mod drive;
pub mod rate_limit;

pub use calendar::GoogleCalendarApi;
pub use client::{ApiClient, FetchOptions};
pub use credentials::{ChainedCredentialProvider, KeyringCredentialProvider, StaticCredentialProvider};
pub use drive::GoogleDriveApi;
