//! Entries returned by remote listing endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a listing page
///
/// Listings in incremental mode report deletions alongside upserts; both
/// are applied in page order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change<T> {
    Upsert(T),
    Removed {
        id: String,
        /// Vendor time of the deletion, when reported
        updated: Option<DateTime<Utc>>,
    },
}

impl<T> Change<T> {
    pub fn is_removal(&self) -> bool {
        matches!(self, Change::Removed { .. })
    }

    pub fn upserted(&self) -> Option<&T> {
        match self {
            Change::Upsert(item) => Some(item),
            Change::Removed { .. } => None,
        }
    }
}
