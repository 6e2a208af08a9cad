//! skillsync Cache - Local store persistence
//!
//! SQLite-backed cache for:
//! - Calendars and their events
//! - Drive files, spreadsheets and documents
//! - Sync state (cursors, watermarks, diagnostics)
//!
//! ## Architecture
//!
//! This crate implements the `ILocalStore` port from `skillsync-core` using
//! SQLite as the storage backend. Every batch write runs inside one
//! transaction, so a failure mid-page leaves nothing of that page behind.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use skillsync_cache::{DatabasePool, SqliteLocalStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/skillsync/cache.db")).await?;
//! let store = SqliteLocalStore::new(pool.pool().clone());
//! // Use store as ILocalStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod store;

pub use pool::DatabasePool;
pub use store::SqliteLocalStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded into a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
