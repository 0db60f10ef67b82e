//! Channel dispatcher: hands a destination to the external code channel.
//!
//! Code generation and delivery happen entirely inside the channel provider;
//! the dispatcher only forwards, logs, and normalizes the provider's answer.

use crate::error::VerificationError;
use async_trait::async_trait;
use ekyc_types::{OtpCode, PhoneNumber};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the provider reports after accepting a send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Cooldown the provider itself enforces, if it reports one.
    pub cooldown_secs: Option<u64>,
}

/// The remote one-time-code provider (`send-code` / `verify-code`).
#[async_trait]
pub trait OtpGateway: Send + Sync {
    /// Generate a code and deliver it to `destination`.
    async fn send_code(&self, destination: &PhoneNumber) -> Result<SendReceipt, VerificationError>;

    /// Check `code` against the last code delivered to `destination`.
    async fn verify_code(
        &self,
        destination: &PhoneNumber,
        code: &OtpCode,
    ) -> Result<bool, VerificationError>;
}

/// Stateless front for an [`OtpGateway`].
#[derive(Clone)]
pub struct ChannelDispatcher {
    gateway: Arc<dyn OtpGateway>,
}

impl ChannelDispatcher {
    pub fn new(gateway: Arc<dyn OtpGateway>) -> Self {
        Self { gateway }
    }

    /// Deliver a fresh code to `destination`.
    pub async fn dispatch(&self, destination: &PhoneNumber) -> Result<SendReceipt, VerificationError> {
        debug!(destination = %destination.masked(), "dispatching one-time code");
        match self.gateway.send_code(destination).await {
            Ok(receipt) => {
                debug!(
                    destination = %destination.masked(),
                    provider_cooldown = ?receipt.cooldown_secs,
                    "code dispatched"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(destination = %destination.masked(), error = %e, "code dispatch failed");
                Err(e)
            }
        }
    }

    /// Ask the provider whether `code` is the one delivered to `destination`.
    pub async fn check(
        &self,
        destination: &PhoneNumber,
        code: &OtpCode,
    ) -> Result<bool, VerificationError> {
        let matched = self.gateway.verify_code(destination, code).await?;
        debug!(destination = %destination.masked(), matched, "code checked");
        Ok(matched)
    }
}
