//! Storage abstractions for raw bulletin persistence.
//!
//! Only the raw bulletin text is durable; parsed records and assessments are
//! recomputed from it on demand.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! └── bulletins/
//!     ├── TWKHH.json        # every distinct issue for the port, oldest first
//!     └── TWKEL.json
//! ```

pub mod credentials;
pub mod local;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::PortInfo;

// Re-export for convenience
pub use credentials::CredentialCache;
pub use local::LocalStorage;

/// A persisted raw bulletin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBulletin {
    pub port_code: String,
    pub station_id: String,
    pub port_name: String,
    pub country: String,
    pub issued_label: String,
    pub content: String,
    /// Hex SHA-256 of `content`
    pub digest: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredBulletin {
    pub fn new(port: &PortInfo, port_name: &str, issued_label: &str, content: &str) -> Self {
        Self {
            port_code: port.code.clone(),
            station_id: port.station_id.clone(),
            port_name: port_name.to_string(),
            country: port.country.clone(),
            issued_label: issued_label.to_string(),
            content: content.to_string(),
            digest: content_digest(content),
            saved_at: Utc::now(),
        }
    }
}

/// Latest stored content for a port.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestContent {
    pub content: String,
    pub issued_label: String,
    pub port_name: String,
}

/// Whether a save wrote a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    /// `(port, issued_label)` already stored; nothing written
    Duplicate,
}

/// Trait for raw bulletin storage backends.
///
/// `(port_code, issued_label)` is unique; saving an existing pair is a
/// successful no-op.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Issued label of the most recently saved bulletin for a port.
    async fn latest_issued_label(&self, port_code: &str) -> Result<Option<String>>;

    /// Content of the most recently saved bulletin for a port.
    async fn latest_content(&self, port_code: &str) -> Result<Option<LatestContent>>;

    /// Persist a raw bulletin.
    async fn save(&self, bulletin: StoredBulletin) -> Result<SaveOutcome>;

    /// Every stored bulletin for a port, oldest first.
    async fn history(&self, port_code: &str) -> Result<Vec<StoredBulletin>>;
}

/// Hex-encoded SHA-256 of a bulletin body.
pub fn content_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Write bytes atomically (write to a sibling temp file, then rename).
///
/// Missing parent directories are created.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_and_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a").join("b.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_content_digest_is_stable() {
        let a = content_digest("PORT NAME: KAOHSIUNG");
        let b = content_digest("PORT NAME: KAOHSIUNG");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_digest("PORT NAME: KEELUNG"));
    }
}
