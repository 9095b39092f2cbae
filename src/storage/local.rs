//! Local filesystem storage implementation.
//!
//! One JSON array per port under `{root}/bulletins/`. Writes go to a temp
//! file first and are renamed into place, and a per-store lock serialises
//! read-modify-write so the `(port, issued_label)` uniqueness holds.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::storage::{LatestContent, RecordStore, SaveOutcome, StoredBulletin, write_atomic};

/// Local filesystem storage backend.
pub struct LocalStorage {
    root_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Storage key for a port's bulletins.
    fn port_key(port_code: &str) -> String {
        let safe: String = port_code
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("bulletins/{}.json", safe.to_uppercase())
    }

    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.path(key), bytes).await
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_port(&self, port_code: &str) -> Result<Vec<StoredBulletin>> {
        Ok(self
            .read_json(&Self::port_key(port_code))
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl RecordStore for LocalStorage {
    async fn latest_issued_label(&self, port_code: &str) -> Result<Option<String>> {
        let rows = self.load_port(port_code).await?;
        Ok(rows.last().map(|row| row.issued_label.clone()))
    }

    async fn latest_content(&self, port_code: &str) -> Result<Option<LatestContent>> {
        let mut rows = self.load_port(port_code).await?;
        Ok(rows.pop().map(|row| LatestContent {
            content: row.content,
            issued_label: row.issued_label,
            port_name: row.port_name,
        }))
    }

    async fn save(&self, bulletin: StoredBulletin) -> Result<SaveOutcome> {
        let _guard = self.write_lock.lock().await;
        let key = Self::port_key(&bulletin.port_code);

        let mut rows = self
            .load_port(&bulletin.port_code)
            .await
            .map_err(AppError::persistence)?;

        if rows
            .iter()
            .any(|row| row.issued_label == bulletin.issued_label)
        {
            log::debug!(
                "Bulletin {} / {} already stored",
                bulletin.port_code,
                bulletin.issued_label
            );
            return Ok(SaveOutcome::Duplicate);
        }

        log::info!(
            "Storing bulletin {} / {} ({} bytes)",
            bulletin.port_code,
            bulletin.issued_label,
            bulletin.content.len()
        );
        rows.push(bulletin);
        self.write_json(&key, &rows)
            .await
            .map_err(AppError::persistence)?;
        Ok(SaveOutcome::Inserted)
    }

    async fn history(&self, port_code: &str) -> Result<Vec<StoredBulletin>> {
        self.load_port(port_code).await
    }
}
