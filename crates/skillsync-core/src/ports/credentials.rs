//! Credential provider port
//!
//! Issuing and refreshing credentials happens elsewhere; the sync engine
//! only asks whether one is present. A missing credential means "skip
//! sync silently", not an error.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer credential for vendor API calls
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

// Keep tokens out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait ICredentialProvider: Send + Sync {
    /// Returns the stored credential, or `None` if the user is not connected
    async fn get_credential(&self) -> Result<Option<Credential>>;

    /// Forgets the stored credential
    async fn revoke(&self) -> Result<()>;
}
