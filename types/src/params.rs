//! Verification parameters: the policy knobs of the orchestrator.
//!
//! Every value is configuration rather than business logic. The defaults
//! preserve the behaviour front-ends already depend on (60 s resend cooldown,
//! 5 sends per challenge, 5 s redirect countdown).

use crate::error::TypeError;
use serde::{Deserialize, Serialize};

/// All tunable verification parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationParams {
    // ── One-time codes ──────────────────────────────────────────────────
    /// Maximum code sends per challenge before it is blocked.
    pub max_otp_attempts: u32,

    /// Minimum seconds between two consecutive sends to the same subject.
    pub otp_cooldown_secs: u64,

    /// Lifetime of a sent code, measured from the send.
    pub otp_ttl_secs: u64,

    /// Wrong-code entries tolerated for one sent code before a fresh send is required.
    pub max_code_guesses: u32,

    // ── Status synchronization ──────────────────────────────────────────
    /// Countdown before redirecting a fully verified subject.
    pub redirect_countdown_secs: u64,

    /// Countdown used by the legacy secondary flow.
    pub legacy_redirect_countdown_secs: u64,

    /// Interval between background status polls while a screen is mounted.
    pub status_poll_interval_secs: u64,

    // ── Biometrics ──────────────────────────────────────────────────────
    /// Minimum face-match score (0.0 to 1.0) accepted as a match.
    pub face_match_threshold: f64,
}

impl VerificationParams {
    pub fn new() -> Self {
        Self {
            max_otp_attempts: 5,
            otp_cooldown_secs: 60,
            otp_ttl_secs: 300,
            max_code_guesses: 5,

            redirect_countdown_secs: 5,
            legacy_redirect_countdown_secs: 15,
            status_poll_interval_secs: 10,

            face_match_threshold: 0.80,
        }
    }

    /// Reject combinations that would make the policy meaningless.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.max_otp_attempts == 0 {
            return Err(TypeError::InvalidParam {
                name: "max_otp_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_code_guesses == 0 {
            return Err(TypeError::InvalidParam {
                name: "max_code_guesses",
                reason: "must be at least 1".into(),
            });
        }
        if self.otp_ttl_secs == 0 {
            return Err(TypeError::InvalidParam {
                name: "otp_ttl_secs",
                reason: "must be positive".into(),
            });
        }
        if self.status_poll_interval_secs == 0 {
            return Err(TypeError::InvalidParam {
                name: "status_poll_interval_secs",
                reason: "must be positive".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.face_match_threshold) {
            return Err(TypeError::InvalidParam {
                name: "face_match_threshold",
                reason: format!("{} is outside [0, 1]", self.face_match_threshold),
            });
        }
        Ok(())
    }
}

impl Default for VerificationParams {
    fn default() -> Self {
        Self::new()
    }
}
