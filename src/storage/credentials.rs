//! Credential bundle persistence.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::CredentialBundle;
use crate::storage::write_atomic;

/// JSON file holding the last authenticated credential bundle.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: PathBuf,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached bundle.
    ///
    /// Missing or unreadable caches yield `None`; the caller re-authenticates.
    pub async fn load(&self) -> Option<CredentialBundle> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No credential cache at {}", self.path.display());
                return None;
            }
            Err(e) => {
                log::warn!(
                    "Failed to read credential cache {}: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                log::warn!(
                    "Ignoring corrupt credential cache {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist a bundle atomically.
    pub async fn store(&self, bundle: &CredentialBundle) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(bundle)?;
        write_atomic(&self.path, &bytes).await?;
        log::debug!(
            "Credential bundle saved to {} ({} cookies)",
            self.path.display(),
            bundle.cookies.len()
        );
        Ok(())
    }
}
