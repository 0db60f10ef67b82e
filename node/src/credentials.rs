//! Credential storage for remembered devices.
//!
//! Entries live in memory and, when a path is configured, are mirrored to a
//! JSON file written through a temporary file and a rename, so a crash never
//! leaves a half-written store behind.

use async_trait::async_trait;
use ekyc_verification::{CredentialStore, VerificationError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::NodeError;

pub struct FileCredentialStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// A store that forgets everything on restart.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open (or create on first write) the store at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, NodeError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                NodeError::CredentialStore(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), entries = entries.len(), "credential store opened");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), VerificationError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| VerificationError::Backend(format!("credential store encode: {e}")))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| VerificationError::Backend(format!("credential store write: {e}")))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| VerificationError::Backend(format!("credential store rename: {e}")))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, VerificationError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VerificationError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_owned(), value.to_owned());
        if let Err(e) = self.persist(&entries).await {
            match previous {
                Some(v) => entries.insert(key.to_owned(), v),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), VerificationError> {
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.remove(key) {
            if let Err(e) = self.persist(&entries).await {
                entries.insert(key.to_owned(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}
