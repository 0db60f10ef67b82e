//! Verification state machine: ordered, one-directional progress per subject.
//!
//! ```text
//! Unverified ─otp─▶ PhoneVerified ─capture─▶ DocumentCaptured ─confirm─▶ DocumentConfirmed ─face─▶ FullyVerified
//! ```
//!
//! Single writer, many readers: only this type mutates a [`VerificationProfile`],
//! and readers get clones or subscribe to [`ProgressEvent`]s.

use crate::challenge::ChallengeStatus;
use crate::clock::Clock;
use crate::error::VerificationError;
use ekyc_types::{SubjectId, Timestamp, VerificationProfile, VerificationStage};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A completed step reported to the state machine, carrying its guard input.
#[derive(Clone, Debug, PartialEq)]
pub enum StageEvent {
    PhoneVerified { challenge_status: ChallengeStatus },
    DocumentCaptured { document_id: String, extraction_succeeded: bool },
    DocumentConfirmed,
    FaceMatched { score: f64, threshold: f64 },
}

impl StageEvent {
    /// The stage the subject must be in for this event to apply.
    pub fn requires(&self) -> VerificationStage {
        match self {
            Self::PhoneVerified { .. } => VerificationStage::Unverified,
            Self::DocumentCaptured { .. } => VerificationStage::PhoneVerified,
            Self::DocumentConfirmed => VerificationStage::DocumentCaptured,
            Self::FaceMatched { .. } => VerificationStage::DocumentConfirmed,
        }
    }

    /// The stage the subject lands in.
    pub fn target(&self) -> VerificationStage {
        match self {
            Self::PhoneVerified { .. } => VerificationStage::PhoneVerified,
            Self::DocumentCaptured { .. } => VerificationStage::DocumentCaptured,
            Self::DocumentConfirmed => VerificationStage::DocumentConfirmed,
            Self::FaceMatched { .. } => VerificationStage::FullyVerified,
        }
    }

    fn check_guard(&self) -> Result<(), VerificationError> {
        match self {
            Self::PhoneVerified { challenge_status } => {
                if *challenge_status != ChallengeStatus::Verified {
                    return Err(VerificationError::PreconditionNotMet {
                        required: VerificationStage::PhoneVerified,
                        actual: VerificationStage::Unverified,
                    });
                }
            }
            Self::DocumentCaptured {
                document_id,
                extraction_succeeded,
            } => {
                if !extraction_succeeded {
                    return Err(VerificationError::ExtractionFailed(format!(
                        "document {document_id} could not be read"
                    )));
                }
            }
            Self::DocumentConfirmed => {}
            Self::FaceMatched { score, threshold } => {
                // NaN scores never match.
                let matched = *score >= *threshold;
                if !matched {
                    return Err(VerificationError::FaceMismatch {
                        score: *score,
                        threshold: *threshold,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Broadcast to every reader when a subject's stage moves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    StageAdvanced {
        subject: SubjectId,
        from: VerificationStage,
        to: VerificationStage,
    },
}

pub struct VerificationStateMachine {
    profiles: RwLock<HashMap<SubjectId, VerificationProfile>>,
    events: broadcast::Sender<ProgressEvent>,
    clock: Arc<dyn Clock>,
}

impl VerificationStateMachine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            profiles: RwLock::new(HashMap::new()),
            events,
            clock,
        }
    }

    /// Current profile; a fresh `Unverified` one for unknown subjects.
    pub fn profile(&self, subject: &SubjectId) -> VerificationProfile {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .cloned()
            .unwrap_or_else(|| VerificationProfile::new(subject.clone()))
    }

    pub fn stage(&self, subject: &SubjectId) -> VerificationStage {
        self.profile(subject).stage()
    }

    /// Whether `event` would be accepted right now (ignoring its guard input).
    pub fn can_apply(&self, subject: &SubjectId, event: &StageEvent) -> bool {
        self.stage(subject) == event.requires()
    }

    /// Fail with `PreconditionNotMet` unless the subject has reached `required`.
    pub fn require_at_least(
        &self,
        subject: &SubjectId,
        required: VerificationStage,
    ) -> Result<VerificationStage, VerificationError> {
        let actual = self.stage(subject);
        if actual < required {
            error!(%subject, %required, %actual, "verification precondition violated");
            return Err(VerificationError::PreconditionNotMet { required, actual });
        }
        Ok(actual)
    }

    /// Apply a completed step.
    ///
    /// Replaying a step the subject is already past is a no-op that returns
    /// the current stage. Skipping ahead fails loudly and changes nothing.
    pub fn apply(
        &self,
        subject: &SubjectId,
        event: StageEvent,
    ) -> Result<VerificationStage, VerificationError> {
        let now = self.clock.now();
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        let profile = profiles
            .entry(subject.clone())
            .or_insert_with(|| VerificationProfile::new(subject.clone()));
        let from = profile.stage();
        let target = event.target();

        if target <= from {
            debug!(%subject, stage = %from, ?event, "stage event already applied");
            return Ok(from);
        }
        if from != event.requires() {
            error!(
                %subject,
                required = %event.requires(),
                actual = %from,
                "stage transition attempted out of order"
            );
            return Err(VerificationError::PreconditionNotMet {
                required: event.requires(),
                actual: from,
            });
        }
        event.check_guard()?;

        match event {
            StageEvent::PhoneVerified { .. } => {
                profile.phone_verified = true;
                profile.phone_verified_at = Some(now);
            }
            StageEvent::DocumentCaptured { document_id, .. } => {
                profile.document_captured = true;
                profile.document_captured_at = Some(now);
                profile.document_id = Some(document_id);
            }
            StageEvent::DocumentConfirmed => {
                profile.document_confirmed = true;
                profile.document_confirmed_at = Some(now);
            }
            StageEvent::FaceMatched { .. } => {
                profile.face_verified = true;
                profile.face_verified_at = Some(now);
            }
        }
        let to = profile.stage();
        drop(profiles);

        self.announce(subject, from, to);
        Ok(to)
    }

    /// Merge a profile fetched from the system of record.
    ///
    /// Milestones only ever turn on. A remote `false` where the local view has
    /// `true` is logged and ignored, as is a remote face match without a
    /// captured document. Returns whether the local stage moved.
    pub fn observe(&self, subject: &SubjectId, remote: &VerificationProfile) -> bool {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        let local = profiles
            .entry(subject.clone())
            .or_insert_with(|| VerificationProfile::new(subject.clone()));
        let from = local.stage();

        if remote.stage() < from {
            warn!(
                %subject,
                local = %from,
                remote = %remote.stage(),
                "system of record reports an earlier stage; keeping local milestones"
            );
        }

        adopt(&mut local.phone_verified, &mut local.phone_verified_at, remote.phone_verified, remote.phone_verified_at);
        adopt(
            &mut local.document_captured,
            &mut local.document_captured_at,
            remote.document_captured,
            remote.document_captured_at,
        );
        adopt(
            &mut local.document_confirmed,
            &mut local.document_confirmed_at,
            remote.document_confirmed,
            remote.document_confirmed_at,
        );
        if remote.face_verified && !local.document_captured {
            warn!(%subject, "ignoring remote face match without a captured document");
        } else {
            adopt(&mut local.face_verified, &mut local.face_verified_at, remote.face_verified, remote.face_verified_at);
        }
        if local.document_id.is_none() {
            local.document_id = remote.document_id.clone();
        }

        let to = local.stage();
        drop(profiles);

        if to != from {
            self.announce(subject, from, to);
            true
        } else {
            false
        }
    }

    /// Receive every future [`ProgressEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Number of subjects that reached the terminal stage.
    pub fn fully_verified_count(&self) -> usize {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| p.is_fully_verified())
            .count()
    }

    fn announce(&self, subject: &SubjectId, from: VerificationStage, to: VerificationStage) {
        info!(%subject, %from, %to, "verification stage advanced");
        // No receivers is fine; progress is also readable via `profile`.
        let _ = self.events.send(ProgressEvent::StageAdvanced {
            subject: subject.clone(),
            from,
            to,
        });
    }
}

fn adopt(flag: &mut bool, at: &mut Option<Timestamp>, remote: bool, remote_at: Option<Timestamp>) {
    if remote && !*flag {
        *flag = true;
        *at = remote_at.or(*at);
    }
}
