//! Persistence of the signed-in identity across restarts.
//!
//! Only the `{user, profile}` pair is kept. It is an optimistic cache: the
//! identity store re-validates it with the backend on the next `fetch_user`.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use evalhub_client::AuthUser;
use evalhub_core::Profile;

use crate::error::{Result, StoreError};

/// The persisted identity pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedIdentity {
    /// Auth identity.
    pub user: Option<AuthUser>,
    /// Profile row.
    pub profile: Option<Profile>,
}

/// Storage for the identity pair.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Read the stored pair; empty when nothing was stored.
    async fn load(&self) -> Result<PersistedIdentity>;

    /// Replace the stored pair.
    async fn save(&self, identity: &PersistedIdentity) -> Result<()>;

    /// Remove the stored pair.
    async fn clear(&self) -> Result<()>;
}

/// Stores the pair as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    /// Persist to `path`. Parent directories are created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl SessionPersistence for JsonFilePersistence {
    async fn load(&self) -> Result<PersistedIdentity> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedIdentity::default());
            }
            Err(e) => return Err(StoreError::Persistence(e.to_string())),
        };
        match serde_json::from_slice(&contents) {
            Ok(identity) => Ok(identity),
            Err(e) => {
                // A corrupt file is treated as signed out; fetch_user repairs it.
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable session file");
                Ok(PersistedIdentity::default())
            }
        }
    }

    async fn save(&self, identity: &PersistedIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(identity)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::Persistence(e.to_string()))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Persistence(e.to_string())),
        }
    }
}

/// Keeps the pair in memory. The default when no session file is configured.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    stored: Mutex<PersistedIdentity>,
}

impl MemoryPersistence {
    /// Start with a pair already stored.
    #[must_use]
    pub fn with(identity: PersistedIdentity) -> Self {
        Self {
            stored: Mutex::new(identity),
        }
    }

    /// Current stored pair.
    #[must_use]
    pub fn snapshot(&self) -> PersistedIdentity {
        self.stored
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set(&self, identity: PersistedIdentity) {
        *self
            .stored
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = identity;
    }
}

#[async_trait]
impl SessionPersistence for MemoryPersistence {
    async fn load(&self) -> Result<PersistedIdentity> {
        Ok(self.snapshot())
    }

    async fn save(&self, identity: &PersistedIdentity) -> Result<()> {
        self.set(identity.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.set(PersistedIdentity::default());
        Ok(())
    }
}
