//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! sync engine. Implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILocalStore`] - Relational cache plus key/value sync state
//! - [`ICalendarApi`] - Calendar list, event listing and event CRUD
//! - [`IDriveApi`] - Drive files, change log, spreadsheet and document details
//! - [`ICredentialProvider`] - Access to the stored vendor credential
//! - [`IStatusSink`] - Write-only status publication

pub mod calendar_api;
pub mod credentials;
pub mod drive_api;
pub mod local_store;
pub mod remote;
pub mod status;

pub use calendar_api::ICalendarApi;
pub use credentials::{Credential, ICredentialProvider};
pub use drive_api::IDriveApi;
pub use local_store::{ApplyStats, Coverage, FileFilter, ILocalStore, StoreTotals};
pub use remote::{ListRequest, Page, RateLimitSnapshot, RateLimitState, RemoteError};
pub use status::{IStatusSink, StatusSnapshot};
