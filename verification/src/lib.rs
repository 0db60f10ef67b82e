//! Verification Challenge Orchestrator.
//!
//! Grants access to sensitive actions only after a subject proves control of a
//! phone number and, for higher-trust actions, an identity document plus a live
//! face match. The pieces, leaves first:
//!
//! 1. **Dispatcher**: hands a destination to the external code channel.
//! 2. **Session manager**: one-time code lifecycle with resend cooldown and
//!    attempt ceiling.
//! 3. **State machine**: ordered progress `phone → document → face`.
//! 4. **Synchronizer**: deduplicated status refreshes and the redirect countdown.
//! 5. **Reconciler**: submits only the fields a human actually corrected.
//!
//! [`VerificationService`] wires them together; it is constructed once and
//! passed by reference to every consumer. External services (SMS, OCR, face
//! scoring, secure storage) are reached only through the traits in
//! [`dispatcher`], [`backend`] and [`device`].

pub mod audit;
pub mod backend;
pub mod challenge;
pub mod clock;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod reconciler;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod state_machine;
pub mod synchronizer;

pub use audit::{AuditAction, AuditEntry, AuditTrail};
pub use backend::{ExtractionResult, FaceMatchResult, VerificationBackend};
pub use challenge::{ChallengePolicy, ChallengeStatus, VerificationChallenge};
pub use clock::{Clock, SystemClock};
pub use device::{CredentialStore, DeviceRegistry};
pub use dispatcher::{ChannelDispatcher, OtpGateway, SendReceipt};
pub use error::{ErrorKind, VerificationError};
pub use queue::SubjectQueue;
pub use reconciler::{ConfirmationReconciler, DocumentRecord, EditEffect, SubmitMode, SubmitOutcome};
pub use scheduler::{TickControl, TimerHandle};
pub use service::{Collaborators, DocumentSubmission, FaceMatchReport, VerificationService};
pub use session::{ChallengeSessionManager, ChallengeTicket, VerifyOutcome};
pub use state_machine::{ProgressEvent, StageEvent, VerificationStateMachine};
pub use synchronizer::{RefreshTrigger, StatusSynchronizer, SyncOptions, SyncSession};
