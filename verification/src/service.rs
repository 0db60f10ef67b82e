//! The orchestrator façade.
//!
//! One [`VerificationService`] is built per process and shared by reference
//! (`Arc`) with every consumer. All state changes go through its methods; no
//! caller writes a challenge, profile or document record directly.

use crate::audit::{AuditEntry, AuditTrail};
use crate::backend::VerificationBackend;
use crate::challenge::{ChallengePolicy, ChallengeStatus, VerificationChallenge};
use crate::clock::Clock;
use crate::device::{CredentialStore, DeviceRegistry};
use crate::dispatcher::{ChannelDispatcher, OtpGateway};
use crate::error::VerificationError;
use crate::queue::SubjectQueue;
use crate::reconciler::{ConfirmationReconciler, DocumentRecord, EditEffect, SubmitMode, SubmitOutcome};
use crate::session::{ChallengeSessionManager, ChallengeTicket};
use crate::state_machine::{ProgressEvent, StageEvent, VerificationStateMachine};
use crate::synchronizer::{RefreshTrigger, StatusSynchronizer, SyncOptions, SyncSession};
use ekyc_types::{
    CaptureRef, DocumentFields, FieldName, OtpCode, PhoneNumber, SubjectId, VerificationParams,
    VerificationProfile, VerificationStage,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// External capabilities the orchestrator is built on.
#[derive(Clone)]
pub struct Collaborators {
    pub otp: Arc<dyn OtpGateway>,
    pub backend: Arc<dyn VerificationBackend>,
    pub credentials: Arc<dyn CredentialStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FaceMatchReport {
    pub matched: bool,
    /// `None` when the subject was already fully verified and no match ran.
    pub score: Option<f64>,
    pub stage: VerificationStage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentSubmission {
    pub outcome: SubmitOutcome,
    pub stage: VerificationStage,
}

pub struct VerificationService {
    params: VerificationParams,
    backend: Arc<dyn VerificationBackend>,
    queue: Arc<SubjectQueue>,
    audit: Arc<AuditTrail>,
    sessions: ChallengeSessionManager,
    state: Arc<VerificationStateMachine>,
    sync: Arc<StatusSynchronizer>,
    reconciler: ConfirmationReconciler,
    devices: DeviceRegistry,
}

impl VerificationService {
    pub fn new(params: VerificationParams, collaborators: Collaborators) -> Result<Self, VerificationError> {
        params.validate()?;
        let Collaborators {
            otp,
            backend,
            credentials,
            clock,
        } = collaborators;

        let queue = Arc::new(SubjectQueue::new());
        let audit = Arc::new(AuditTrail::new());
        let state = Arc::new(VerificationStateMachine::new(clock.clone()));
        let sessions = ChallengeSessionManager::new(
            ChannelDispatcher::new(otp),
            ChallengePolicy::from(&params),
            clock,
            queue.clone(),
            audit.clone(),
        );
        let sync = Arc::new(StatusSynchronizer::new(backend.clone(), state.clone()));
        let reconciler = ConfirmationReconciler::new(backend.clone(), queue.clone());
        let devices = DeviceRegistry::new(credentials, state.clone());

        info!(
            max_otp_attempts = params.max_otp_attempts,
            otp_cooldown_secs = params.otp_cooldown_secs,
            face_match_threshold = params.face_match_threshold,
            "verification service ready"
        );

        Ok(Self {
            params,
            backend,
            queue,
            audit,
            sessions,
            state,
            sync,
            reconciler,
            devices,
        })
    }

    // ── One-time codes ──────────────────────────────────────────────────

    pub async fn request_code(
        &self,
        subject: &SubjectId,
        destination: &PhoneNumber,
    ) -> Result<ChallengeTicket, VerificationError> {
        self.sessions.request_challenge(subject, destination).await
    }

    /// Verify a code and advance to `PhoneVerified`.
    pub async fn verify_code(
        &self,
        subject: &SubjectId,
        code: &OtpCode,
    ) -> Result<VerificationStage, VerificationError> {
        // `Ok` means the challenge was committed as `Verified`.
        self.sessions.verify_challenge(subject, code).await?;
        self.state.apply(
            subject,
            StageEvent::PhoneVerified {
                challenge_status: ChallengeStatus::Verified,
            },
        )
    }

    /// Support reset of a blocked challenge.
    pub async fn reset_challenge(&self, subject: &SubjectId) -> bool {
        self.sessions.reset(subject).await
    }

    pub fn challenge(&self, subject: &SubjectId) -> Option<VerificationChallenge> {
        self.sessions.challenge(subject)
    }

    /// Subjects with an operation running or queued.
    pub fn active_subjects(&self) -> usize {
        self.queue.len()
    }

    pub fn cooldown_remaining(&self, subject: &SubjectId) -> u64 {
        self.sessions.cooldown_remaining(subject)
    }

    // ── Document ────────────────────────────────────────────────────────

    /// Submit a document capture for extraction and advance to `DocumentCaptured`.
    pub async fn capture_document(
        &self,
        subject: &SubjectId,
        capture: &CaptureRef,
    ) -> Result<VerificationStage, VerificationError> {
        self.state
            .require_at_least(subject, VerificationStage::PhoneVerified)?;
        let extraction = {
            let _turn = self.queue.enter(subject).await;
            self.backend.capture_document(subject, capture).await?
        };
        if !extraction.succeeded {
            let reason = extraction
                .reason
                .unwrap_or_else(|| "document could not be read".into());
            info!(%subject, document_id = %extraction.document_id, %reason, "document extraction failed");
            return Err(VerificationError::ExtractionFailed(reason));
        }
        self.state.apply(
            subject,
            StageEvent::DocumentCaptured {
                document_id: extraction.document_id,
                extraction_succeeded: true,
            },
        )
    }

    /// Load the extracted fields as the editing baseline.
    pub async fn load_document(&self, subject: &SubjectId) -> Result<DocumentFields, VerificationError> {
        self.state
            .require_at_least(subject, VerificationStage::DocumentCaptured)?;
        self.reconciler.load_snapshot(subject).await
    }

    pub fn edit_field(
        &self,
        subject: &SubjectId,
        field: FieldName,
        value: &str,
    ) -> Result<EditEffect, VerificationError> {
        self.reconciler.record_edit(subject, field, value)
    }

    pub fn discard_edits(&self, subject: &SubjectId) -> usize {
        self.reconciler.discard(subject)
    }

    pub fn document(&self, subject: &SubjectId) -> Option<DocumentRecord> {
        self.reconciler.record(subject)
    }

    /// Submit corrections or confirm as-is, then advance to `DocumentConfirmed`.
    pub async fn submit_document(
        &self,
        subject: &SubjectId,
        mode: SubmitMode,
    ) -> Result<DocumentSubmission, VerificationError> {
        self.state
            .require_at_least(subject, VerificationStage::DocumentCaptured)?;
        let outcome = self.reconciler.submit(subject, mode).await?;
        let confirmed = self
            .reconciler
            .record(subject)
            .is_some_and(|r| r.confirmed_once);
        let stage = if confirmed {
            self.state.apply(subject, StageEvent::DocumentConfirmed)?
        } else {
            self.state.stage(subject)
        };
        Ok(DocumentSubmission { outcome, stage })
    }

    // ── Face match ──────────────────────────────────────────────────────

    /// Match a live capture against the confirmed document.
    pub async fn request_face_match(
        &self,
        subject: &SubjectId,
        live_capture: &CaptureRef,
    ) -> Result<FaceMatchReport, VerificationError> {
        let stage = self
            .state
            .require_at_least(subject, VerificationStage::DocumentConfirmed)?;
        if stage.is_terminal() {
            return Ok(FaceMatchReport {
                matched: true,
                score: None,
                stage,
            });
        }

        let result = {
            let _turn = self.queue.enter(subject).await;
            self.backend.face_match(subject, live_capture).await?
        };
        let threshold = self.params.face_match_threshold;
        if !result.matched {
            warn!(%subject, score = result.score, threshold, "provider reported no face match");
            return Err(VerificationError::FaceMismatch {
                score: result.score,
                threshold,
            });
        }
        let stage = self.state.apply(
            subject,
            StageEvent::FaceMatched {
                score: result.score,
                threshold,
            },
        )?;
        Ok(FaceMatchReport {
            matched: true,
            score: Some(result.score),
            stage,
        })
    }

    // ── Status ──────────────────────────────────────────────────────────

    /// Local view of the subject's progress.
    pub fn status(&self, subject: &SubjectId) -> VerificationProfile {
        self.state.profile(subject)
    }

    pub async fn refresh_status(&self, subject: &SubjectId) -> Result<VerificationProfile, VerificationError> {
        self.sync.refresh(subject, RefreshTrigger::Manual).await
    }

    /// Open a sync session for one UI context. Call `mount` on it to start.
    pub fn attach_session<F>(&self, subject: SubjectId, options: SyncOptions, on_redirect: F) -> SyncSession
    where
        F: FnOnce() + Send + 'static,
    {
        SyncSession::new(subject, self.sync.clone(), options, on_redirect)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.state.subscribe()
    }

    pub fn fully_verified_count(&self) -> usize {
        self.state.fully_verified_count()
    }

    pub fn status_fetches_issued(&self) -> u64 {
        self.sync.fetches_issued()
    }

    // ── Remembered device ───────────────────────────────────────────────

    pub async fn remember_device(&self, subject: &SubjectId, credential: &str) -> Result<(), VerificationError> {
        self.devices.remember(subject, credential).await
    }

    pub async fn recall_device(&self, subject: &SubjectId) -> Result<Option<String>, VerificationError> {
        self.devices.recall(subject).await
    }

    pub async fn forget_device(&self, subject: &SubjectId) -> Result<bool, VerificationError> {
        self.devices.forget(subject).await
    }

    // ── Misc ────────────────────────────────────────────────────────────

    pub fn audit_entries(&self, subject: &SubjectId) -> Vec<AuditEntry> {
        self.audit.entries_for(subject)
    }

    pub fn params(&self) -> &VerificationParams {
        &self.params
    }
}
