//! Nullable code channel: record sends instead of delivering SMS.

use async_trait::async_trait;
use ekyc_types::{OtpCode, PhoneNumber};
use ekyc_verification::{OtpGateway, SendReceipt, VerificationError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The code every `NullOtpGateway` accepts unless told otherwise.
pub const DEFAULT_CODE: &str = "123456";

/// A test code channel that records every send and accepts one known code.
#[derive(Debug)]
pub struct NullOtpGateway {
    code: Mutex<String>,
    sent: Mutex<Vec<PhoneNumber>>,
    send_failures: Mutex<VecDeque<VerificationError>>,
    verify_failures: Mutex<VecDeque<VerificationError>>,
    provider_cooldown: Mutex<Option<u64>>,
    verify_delay: Mutex<Option<Duration>>,
    verify_calls: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NullOtpGateway {
    pub fn new() -> Self {
        Self::with_code(DEFAULT_CODE)
    }

    pub fn with_code(code: &str) -> Self {
        Self {
            code: Mutex::new(code.to_owned()),
            sent: Mutex::new(Vec::new()),
            send_failures: Mutex::new(VecDeque::new()),
            verify_failures: Mutex::new(VecDeque::new()),
            provider_cooldown: Mutex::new(None),
            verify_delay: Mutex::new(None),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Change the code the channel accepts (as if a new one was generated).
    pub fn set_code(&self, code: &str) {
        *lock(&self.code) = code.to_owned();
    }

    /// Make the next send fail with `error`. Calls stack up in order.
    pub fn fail_next_send(&self, error: VerificationError) {
        lock(&self.send_failures).push_back(error);
    }

    /// Make the next verify fail with `error`.
    pub fn fail_next_verify(&self, error: VerificationError) {
        lock(&self.verify_failures).push_back(error);
    }

    /// Cooldown the provider reports in its send receipts.
    pub fn set_provider_cooldown(&self, secs: Option<u64>) {
        *lock(&self.provider_cooldown) = secs;
    }

    /// Hold every verify request for `delay` before answering.
    pub fn delay_verifies(&self, delay: Duration) {
        *lock(&self.verify_delay) = Some(delay);
    }

    /// Every destination a code was delivered to, in order.
    pub fn sent(&self) -> Vec<PhoneNumber> {
        lock(&self.sent).clone()
    }

    pub fn send_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// How many verify requests reached the channel.
    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

impl Default for NullOtpGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OtpGateway for NullOtpGateway {
    async fn send_code(&self, destination: &PhoneNumber) -> Result<SendReceipt, VerificationError> {
        if let Some(e) = lock(&self.send_failures).pop_front() {
            return Err(e);
        }
        lock(&self.sent).push(destination.clone());
        Ok(SendReceipt {
            cooldown_secs: *lock(&self.provider_cooldown),
        })
    }

    async fn verify_code(&self, _destination: &PhoneNumber, code: &OtpCode) -> Result<bool, VerificationError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.verify_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = lock(&self.verify_failures).pop_front() {
            return Err(e);
        }
        Ok(code.expose() == lock(&self.code).as_str())
    }
}
