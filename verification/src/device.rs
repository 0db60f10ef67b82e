//! "Remember this device": a biometric-login credential kept in secure storage.

use crate::error::VerificationError;
use crate::state_machine::VerificationStateMachine;
use async_trait::async_trait;
use ekyc_types::{SubjectId, VerificationStage};
use std::sync::Arc;
use tracing::info;

/// Opaque secure key-value storage supplied by the platform.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, VerificationError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), VerificationError>;
    async fn delete(&self, key: &str) -> Result<(), VerificationError>;
}

pub struct DeviceRegistry {
    store: Arc<dyn CredentialStore>,
    state: Arc<VerificationStateMachine>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn CredentialStore>, state: Arc<VerificationStateMachine>) -> Self {
        Self { store, state }
    }

    fn key(subject: &SubjectId) -> String {
        format!("ekyc.device.{subject}")
    }

    /// Store `credential` for later biometric login. Only fully verified
    /// subjects may remember a device.
    pub async fn remember(&self, subject: &SubjectId, credential: &str) -> Result<(), VerificationError> {
        self.state
            .require_at_least(subject, VerificationStage::FullyVerified)?;
        if credential.trim().is_empty() {
            return Err(VerificationError::Validation(
                "device credential must not be empty".into(),
            ));
        }
        self.store.set(&Self::key(subject), credential).await?;
        info!(%subject, "device remembered");
        Ok(())
    }

    pub async fn recall(&self, subject: &SubjectId) -> Result<Option<String>, VerificationError> {
        self.store.get(&Self::key(subject)).await
    }

    /// Remove the remembered credential. Returns whether one existed.
    pub async fn forget(&self, subject: &SubjectId) -> Result<bool, VerificationError> {
        let key = Self::key(subject);
        let existed = self.store.get(&key).await?.is_some();
        if existed {
            self.store.delete(&key).await?;
            info!(%subject, "device forgotten");
        }
        Ok(existed)
    }
}
