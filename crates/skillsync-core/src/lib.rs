//! skillsync Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `RemoteCollection`, `CalendarEvent`, `DriveFile`, `Spreadsheet`, `Document`
//! - **Sync state** - namespaced cursor/watermark keys and their JSON records
//! - **Port definitions** - Traits for adapters: `ILocalStore`, `ICalendarApi`, `IDriveApi`,
//!   `ICredentialProvider`, `IStatusSink`
//! - **Configuration** - YAML-backed settings with validation
//!
//! # Architecture
//!
//! The domain module holds plain data with no I/O. Ports define the trait
//! interfaces that the cache, google and sync crates implement or consume.

pub mod config;
pub mod domain;
pub mod ports;
