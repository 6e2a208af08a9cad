//! Credential providers
//!
//! - [`StaticCredentialProvider`] - a token handed over at startup (config,
//!   environment variable, tests)
//! - [`KeyringCredentialProvider`] - a JSON-encoded [`Credential`] kept in the
//!   system keyring by whatever performed the OAuth flow
//! - [`ChainedCredentialProvider`] - first provider that has a credential wins

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use skillsync_core::ports::{Credential, ICredentialProvider};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Keyring service name for stored credentials
const KEYRING_SERVICE: &str = "skillsync";

// ============================================================================
// StaticCredentialProvider
// ============================================================================

/// Holds a credential in memory; `revoke()` forgets it
#[derive(Debug, Default)]
pub struct StaticCredentialProvider {
    credential: RwLock<Option<Credential>>,
}

impl StaticCredentialProvider {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::from_credential(Credential::bearer(access_token))
    }

    pub fn from_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }

    /// Provider without a credential (the "not connected" state)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads a bearer token from the environment variable `var`
    ///
    /// An unset or blank variable yields an empty provider.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => {
                debug!(var, "Using access token from environment");
                Self::new(token.trim())
            }
            _ => Self::empty(),
        }
    }
}

#[async_trait]
impl ICredentialProvider for StaticCredentialProvider {
    async fn get_credential(&self) -> Result<Option<Credential>> {
        Ok(self.credential.read().await.clone())
    }

    async fn revoke(&self) -> Result<()> {
        *self.credential.write().await = None;
        Ok(())
    }
}

// ============================================================================
// KeyringCredentialProvider
// ============================================================================

/// Reads and writes a credential in the system keyring
///
/// The entry lives under service `skillsync` with the configured account as
/// username, holding the JSON form of [`Credential`].
#[derive(Debug, Clone)]
pub struct KeyringCredentialProvider {
    account: String,
}

impl KeyringCredentialProvider {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &self.account)
            .context("Failed to create keyring entry")
    }

    /// Stores `credential`, replacing any previous one
    pub fn store(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_string(credential).context("Failed to serialize credential")?;
        self.entry()?
            .set_password(&json)
            .context("Failed to store credential in keyring")?;
        info!(account = %self.account, "Stored credential in keyring");
        Ok(())
    }
}

#[async_trait]
impl ICredentialProvider for KeyringCredentialProvider {
    async fn get_credential(&self) -> Result<Option<Credential>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let credential = serde_json::from_str(&json)
                    .context("Failed to deserialize credential from keyring")?;
                Ok(Some(credential))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account = %self.account, "No credential in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    async fn revoke(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(account = %self.account, "Removed credential from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

// ============================================================================
// ChainedCredentialProvider
// ============================================================================

/// Asks each provider in order; revoking revokes all of them
pub struct ChainedCredentialProvider {
    providers: Vec<Arc<dyn ICredentialProvider>>,
}

impl ChainedCredentialProvider {
    pub fn new(providers: Vec<Arc<dyn ICredentialProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl ICredentialProvider for ChainedCredentialProvider {
    async fn get_credential(&self) -> Result<Option<Credential>> {
        for provider in &self.providers {
            if let Some(credential) = provider.get_credential().await? {
                return Ok(Some(credential));
            }
        }
        Ok(None)
    }

    async fn revoke(&self) -> Result<()> {
        for provider in &self.providers {
            provider.revoke().await?;
        }
        Ok(())
    }
}
