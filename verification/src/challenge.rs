//! One-time-code challenge: policy state for a single subject.
//!
//! Pure bookkeeping with no I/O. The session manager decides *when* to call
//! these methods; this module decides *whether* a send or verify is allowed.

use crate::error::VerificationError;
use ekyc_types::{PhoneNumber, SubjectId, Timestamp, VerificationParams};
use serde::Serialize;

/// Limits applied to every challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChallengePolicy {
    pub max_attempts: u32,
    pub cooldown_secs: u64,
    pub ttl_secs: u64,
    pub max_guesses: u32,
}

impl From<&VerificationParams> for ChallengePolicy {
    fn from(p: &VerificationParams) -> Self {
        Self {
            max_attempts: p.max_otp_attempts,
            cooldown_secs: p.otp_cooldown_secs,
            ttl_secs: p.otp_ttl_secs,
            max_guesses: p.max_code_guesses,
        }
    }
}

impl Default for ChallengePolicy {
    fn default() -> Self {
        Self::from(&VerificationParams::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChallengeStatus {
    /// Created, no code delivered yet.
    Idle,
    /// A code is outstanding.
    Sent,
    /// The subject entered the right code. Terminal.
    Verified,
    /// Send ceiling hit. Terminal until a support reset.
    Blocked,
    /// The outstanding code is past its lifetime.
    Expired,
}

/// Whether a verify attempt should reach the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyGate {
    Proceed,
    AlreadyVerified,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationChallenge {
    pub subject_id: SubjectId,
    /// Destination of the most recent send.
    pub channel: PhoneNumber,
    pub issued_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    /// Effective cooldown: the configured one, or longer if the provider asked.
    pub cooldown_secs: u64,
    pub last_sent_at: Option<Timestamp>,
    pub status: ChallengeStatus,
    /// Wrong codes entered against the outstanding code.
    pub failed_guesses: u32,
    pub verified_at: Option<Timestamp>,
}

impl VerificationChallenge {
    pub fn new(subject_id: SubjectId, channel: PhoneNumber, policy: &ChallengePolicy) -> Self {
        Self {
            subject_id,
            channel,
            issued_at: None,
            expires_at: None,
            attempt_count: 0,
            max_attempts: policy.max_attempts,
            cooldown_secs: policy.cooldown_secs,
            last_sent_at: None,
            status: ChallengeStatus::Idle,
            failed_guesses: 0,
            verified_at: None,
        }
    }

    /// The next challenge after this one was verified. The send history
    /// carries over so the cooldown and the attempt ceiling still apply.
    pub fn renew(&self, channel: PhoneNumber) -> Self {
        Self {
            subject_id: self.subject_id.clone(),
            channel,
            issued_at: None,
            expires_at: None,
            attempt_count: self.attempt_count,
            max_attempts: self.max_attempts,
            cooldown_secs: self.cooldown_secs,
            last_sent_at: self.last_sent_at,
            status: ChallengeStatus::Idle,
            failed_guesses: 0,
            verified_at: None,
        }
    }

    /// Seconds until another send is allowed; zero when allowed now.
    pub fn cooldown_remaining(&self, now: Timestamp) -> u64 {
        self.last_sent_at
            .map(|sent| sent.remaining(self.cooldown_secs, now))
            .unwrap_or(0)
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }

    /// A code is unusable strictly after `expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// Gate a send. The ceiling is checked before the cooldown, so an
    /// exhausted challenge reports `RateLimitExceeded` even mid-cooldown.
    pub fn check_send(&mut self, now: Timestamp) -> Result<(), VerificationError> {
        if self.status == ChallengeStatus::Blocked || self.attempt_count >= self.max_attempts {
            self.status = ChallengeStatus::Blocked;
            return Err(VerificationError::RateLimitExceeded {
                attempts: self.attempt_count,
                max: self.max_attempts,
            });
        }
        let seconds_remaining = self.cooldown_remaining(now);
        if seconds_remaining > 0 {
            return Err(VerificationError::CooldownActive { seconds_remaining });
        }
        Ok(())
    }

    /// Record a delivered code. Starts a new cooldown and code lifetime and
    /// forgets wrong guesses made against the previous code.
    pub fn record_send(
        &mut self,
        destination: PhoneNumber,
        sent_at: Timestamp,
        cooldown_secs: u64,
        ttl_secs: u64,
    ) {
        self.channel = destination;
        self.attempt_count = (self.attempt_count + 1).min(self.max_attempts);
        self.last_sent_at = Some(sent_at);
        self.issued_at = Some(sent_at);
        self.expires_at = Some(sent_at.plus(ttl_secs));
        self.cooldown_secs = cooldown_secs;
        self.failed_guesses = 0;
        self.status = ChallengeStatus::Sent;
    }

    /// Gate a verify attempt.
    pub fn check_verify(
        &mut self,
        now: Timestamp,
        max_guesses: u32,
    ) -> Result<VerifyGate, VerificationError> {
        match self.status {
            ChallengeStatus::Verified => Ok(VerifyGate::AlreadyVerified),
            ChallengeStatus::Blocked => Err(VerificationError::RateLimitExceeded {
                attempts: self.attempt_count,
                max: self.max_attempts,
            }),
            ChallengeStatus::Idle => Err(VerificationError::NoActiveChallenge(
                self.subject_id.clone(),
            )),
            ChallengeStatus::Expired => Err(VerificationError::ExpiredChallenge),
            ChallengeStatus::Sent => {
                if self.is_expired(now) {
                    self.status = ChallengeStatus::Expired;
                    return Err(VerificationError::ExpiredChallenge);
                }
                if self.failed_guesses >= max_guesses {
                    return Err(VerificationError::GuessesExhausted);
                }
                Ok(VerifyGate::Proceed)
            }
        }
    }

    /// Record a wrong code. Does not touch the send cooldown.
    pub fn record_mismatch(&mut self, max_guesses: u32) -> VerificationError {
        self.failed_guesses = self.failed_guesses.saturating_add(1);
        VerificationError::InvalidCode {
            guesses_remaining: max_guesses.saturating_sub(self.failed_guesses),
        }
    }

    pub fn record_verified(&mut self, now: Timestamp) {
        self.status = ChallengeStatus::Verified;
        self.verified_at = Some(now);
    }

    pub fn mark_expired(&mut self) {
        if self.status == ChallengeStatus::Sent {
            self.status = ChallengeStatus::Expired;
        }
    }
}
