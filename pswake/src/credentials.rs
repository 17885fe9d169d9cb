//! Credential storage
//!
//! The library reads credentials before every wake and writes them only
//! when the registration flow captures new ones. Storage stays behind
//! [`CredentialStore`]; two implementations are provided.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use pswake_types::Credentials;
use tracing::debug;

use crate::error::{Error, Result};

/// Credential storage collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load credentials, `CredentialsNotFound` if none are stored
    async fn read(&self) -> Result<Credentials>;

    async fn write(&self, credentials: &Credentials) -> Result<()>;
}

/// JSON file store
///
/// The file holds `{"client-type": .., "auth-type": .., "user-credential": ..}`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// File name used in the home directory by default
    pub const DEFAULT_FILE_NAME: &'static str = ".ps4-wake.credentials.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the user's home directory
    pub fn in_home_dir() -> Self {
        let home = ["HOME", "USERPROFILE", "HOMEPATH"]
            .iter()
            .find_map(|key| std::env::var_os(key))
            .map(PathBuf::from)
            .unwrap_or_default();
        Self::new(home.join(Self::DEFAULT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read(&self) -> Result<Credentials> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CredentialsNotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Read credentials from {}", self.path.display());
        Ok(serde_json::from_slice(&data)?)
    }

    async fn write(&self, credentials: &Credentials) -> Result<()> {
        let data = serde_json::to_vec(credentials)?;
        tokio::fs::write(&self.path, data).await?;

        debug!("Wrote credentials to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    pub fn get(&self) -> Option<Credentials> {
        self.credentials.read().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read(&self) -> Result<Credentials> {
        self.get()
            .ok_or_else(|| Error::CredentialsNotFound("memory".into()))
    }

    async fn write(&self, credentials: &Credentials) -> Result<()> {
        *self.credentials.write() = Some(credentials.clone());
        Ok(())
    }
}
