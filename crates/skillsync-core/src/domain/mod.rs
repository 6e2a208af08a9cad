//! Domain entities
//!
//! This module contains the core domain types for skillsync:
//! - Newtypes for identifiers, cursors and time ranges
//! - Remote collections (calendars, the Drive tree)
//! - Items: calendar events, drive files, spreadsheets, documents
//! - Listing changes and sync state records
//! - Domain-specific error types

pub mod change;
pub mod collection;
pub mod drive;
pub mod errors;
pub mod event;
pub mod newtypes;
pub mod payload;
pub mod sync_state;

// Re-export commonly used types
pub use change::Change;
pub use collection::{CollectionKind, RemoteCollection};
pub use drive::{ContentKind, ContentRef, Document, DriveFile, Spreadsheet};
pub use errors::DomainError;
pub use event::{CalendarEvent, EventTime};
pub use newtypes::*;
pub use payload::ExtensionPayload;
pub use sync_state::{CollectionMeta, ListingResume, RequestedRange, RunSummary, SyncStateKey};
