//! Challenge session manager: issue, resend, verify, and reset one-time codes.
//!
//! Owns every [`VerificationChallenge`]. Policy checks and bookkeeping happen
//! under a short lock; provider calls happen inside the subject's queue turn
//! with no lock held, so the two halves of an operation can never interleave
//! with another operation on the same subject.

use crate::audit::{AuditAction, AuditEntry, AuditTrail};
use crate::challenge::{ChallengePolicy, ChallengeStatus, VerificationChallenge, VerifyGate};
use crate::clock::Clock;
use crate::dispatcher::ChannelDispatcher;
use crate::error::VerificationError;
use crate::queue::SubjectQueue;
use ekyc_types::{OtpCode, PhoneNumber, SubjectId, Timestamp};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Returned by a successful send, for the resend countdown in the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChallengeTicket {
    pub cooldown_secs: u64,
    pub attempts_remaining: u32,
    pub expires_at: Timestamp,
}

/// Returned by a successful verify.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VerifyOutcome {
    pub verified_at: Timestamp,
    /// The challenge had already been verified; nothing was sent to the provider.
    pub already_verified: bool,
}

pub struct ChallengeSessionManager {
    dispatcher: ChannelDispatcher,
    policy: ChallengePolicy,
    clock: Arc<dyn Clock>,
    queue: Arc<SubjectQueue>,
    audit: Arc<AuditTrail>,
    challenges: Mutex<HashMap<SubjectId, VerificationChallenge>>,
}

impl ChallengeSessionManager {
    pub fn new(
        dispatcher: ChannelDispatcher,
        policy: ChallengePolicy,
        clock: Arc<dyn Clock>,
        queue: Arc<SubjectQueue>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            dispatcher,
            policy,
            clock,
            queue,
            audit,
            challenges: Mutex::new(HashMap::new()),
        }
    }

    fn challenges(&self) -> MutexGuard<'_, HashMap<SubjectId, VerificationChallenge>> {
        self.challenges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn audit(
        &self,
        subject: &SubjectId,
        action: AuditAction,
        destination: Option<&PhoneNumber>,
        outcome: impl Into<String>,
    ) {
        self.audit.record(AuditEntry {
            at: self.clock.now(),
            subject: subject.clone(),
            action,
            destination: destination.map(PhoneNumber::masked),
            outcome: outcome.into(),
        });
    }

    /// Send a code to `destination`, subject to the ceiling and cooldown.
    ///
    /// A failed dispatch consumes no attempt and starts no cooldown. Changing
    /// the destination keeps the subject's counters, so switching numbers does
    /// not reset the ceiling.
    pub async fn request_challenge(
        &self,
        subject: &SubjectId,
        destination: &PhoneNumber,
    ) -> Result<ChallengeTicket, VerificationError> {
        let _turn = self.queue.enter(subject).await;
        let now = self.clock.now();

        // Nothing new is stored until a code is actually delivered. A verified
        // challenge is gated through its renewal and left as it is.
        let gate = {
            let mut challenges = self.challenges();
            match challenges.get_mut(subject) {
                Some(c) if c.status == ChallengeStatus::Verified => {
                    c.renew(destination.clone()).check_send(now)
                }
                Some(c) => c.check_send(now),
                None => VerificationChallenge::new(subject.clone(), destination.clone(), &self.policy)
                    .check_send(now),
            }
        };
        if let Err(e) = gate {
            info!(%subject, error = %e, "code send rejected by policy");
            self.audit(subject, AuditAction::SendRejected, Some(destination), e.kind().as_str());
            return Err(e);
        }

        let receipt = match self.dispatcher.dispatch(destination).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if let VerificationError::RateLimitExceeded { .. } = e {
                    self.challenges()
                        .entry(subject.clone())
                        .or_insert_with(|| {
                            VerificationChallenge::new(subject.clone(), destination.clone(), &self.policy)
                        })
                        .status = ChallengeStatus::Blocked;
                }
                self.audit(subject, AuditAction::SendFailed, Some(destination), e.kind().as_str());
                return Err(e);
            }
        };

        let sent_at = self.clock.now();
        let cooldown_secs = receipt
            .cooldown_secs
            .map_or(self.policy.cooldown_secs, |c| c.max(self.policy.cooldown_secs));

        let ticket = {
            let mut challenges = self.challenges();
            let challenge = challenges
                .entry(subject.clone())
                .and_modify(|c| {
                    if c.status == ChallengeStatus::Verified {
                        debug!(%subject, "previous challenge verified; starting a fresh one");
                        *c = c.renew(destination.clone());
                    }
                })
                .or_insert_with(|| {
                    VerificationChallenge::new(subject.clone(), destination.clone(), &self.policy)
                });
            challenge.record_send(destination.clone(), sent_at, cooldown_secs, self.policy.ttl_secs);
            ChallengeTicket {
                cooldown_secs,
                attempts_remaining: challenge.attempts_remaining(),
                expires_at: sent_at.plus(self.policy.ttl_secs),
            }
        };

        info!(
            %subject,
            destination = %destination.masked(),
            attempts_remaining = ticket.attempts_remaining,
            "one-time code sent"
        );
        self.audit(subject, AuditAction::CodeSent, Some(destination), "ok");
        Ok(ticket)
    }

    /// Check `code` against the outstanding challenge.
    ///
    /// Repeated calls after success return the original outcome without
    /// contacting the provider.
    pub async fn verify_challenge(
        &self,
        subject: &SubjectId,
        code: &OtpCode,
    ) -> Result<VerifyOutcome, VerificationError> {
        let _turn = self.queue.enter(subject).await;
        let now = self.clock.now();

        let gate = {
            let mut challenges = self.challenges();
            match challenges.get_mut(subject) {
                None => Err(VerificationError::NoActiveChallenge(subject.clone())),
                Some(c) => c
                    .check_verify(now, self.policy.max_guesses)
                    .map(|gate| (gate, c.channel.clone(), c.verified_at)),
            }
        };
        let (destination, gate, verified_at) = match gate {
            Ok((gate, destination, verified_at)) => (destination, gate, verified_at),
            Err(e) => {
                debug!(%subject, error = %e, "verify rejected before reaching provider");
                self.audit(subject, AuditAction::VerifyRejected, None, e.kind().as_str());
                return Err(e);
            }
        };

        if gate == VerifyGate::AlreadyVerified {
            return Ok(VerifyOutcome {
                verified_at: verified_at.unwrap_or(now),
                already_verified: true,
            });
        }

        let checked = self.dispatcher.check(&destination, code).await;
        let mut challenges = self.challenges();
        let Some(challenge) = challenges.get_mut(subject) else {
            return Err(VerificationError::NoActiveChallenge(subject.clone()));
        };

        match checked {
            Ok(true) => {
                challenge.record_verified(now);
                drop(challenges);
                info!(%subject, "one-time code verified");
                self.audit(subject, AuditAction::CodeVerified, Some(&destination), "ok");
                Ok(VerifyOutcome {
                    verified_at: now,
                    already_verified: false,
                })
            }
            Ok(false) | Err(VerificationError::InvalidCode { .. }) => {
                let e = challenge.record_mismatch(self.policy.max_guesses);
                drop(challenges);
                info!(%subject, error = %e, "wrong one-time code");
                self.audit(subject, AuditAction::VerifyRejected, Some(&destination), e.kind().as_str());
                Err(e)
            }
            Err(e) => {
                if e == VerificationError::ExpiredChallenge {
                    challenge.mark_expired();
                }
                drop(challenges);
                self.audit(subject, AuditAction::VerifyFailed, Some(&destination), e.kind().as_str());
                Err(e)
            }
        }
    }

    /// Support reset: forget the subject's challenge entirely. Returns whether
    /// there was one.
    pub async fn reset(&self, subject: &SubjectId) -> bool {
        let _turn = self.queue.enter(subject).await;
        let removed = self.challenges().remove(subject);
        let existed = removed.is_some();
        info!(%subject, existed, "challenge reset");
        self.audit(
            subject,
            AuditAction::ChallengeReset,
            removed.as_ref().map(|c| &c.channel),
            if existed { "ok" } else { "none" },
        );
        existed
    }

    /// Read-only copy of the subject's challenge.
    pub fn challenge(&self, subject: &SubjectId) -> Option<VerificationChallenge> {
        self.challenges().get(subject).cloned()
    }

    /// Seconds until the subject may request another code.
    pub fn cooldown_remaining(&self, subject: &SubjectId) -> u64 {
        let now = self.clock.now();
        self.challenges()
            .get(subject)
            .map_or(0, |c| c.cooldown_remaining(now))
    }

    pub fn policy(&self) -> &ChallengePolicy {
        &self.policy
    }
}
