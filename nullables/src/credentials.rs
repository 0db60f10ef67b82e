//! Nullable credential store: an in-memory keystore.

use async_trait::async_trait;
use ekyc_verification::{CredentialStore, VerificationError};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct NullCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl NullCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored key (for assertions).
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CredentialStore for NullCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, VerificationError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VerificationError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), VerificationError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
