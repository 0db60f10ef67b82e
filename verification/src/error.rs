use ekyc_types::{SubjectId, TypeError, VerificationStage};
use thiserror::Error;

/// Every failure the orchestrator or one of its collaborators can report.
///
/// `Clone` so a single deduplicated status fetch can hand the same result to
/// every waiter.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum VerificationError {
    #[error("send limit reached ({attempts}/{max}); contact support to reset")]
    RateLimitExceeded { attempts: u32, max: u32 },

    #[error("resend available in {seconds_remaining}s")]
    CooldownActive { seconds_remaining: u64 },

    #[error("code does not match ({guesses_remaining} guesses left)")]
    InvalidCode { guesses_remaining: u32 },

    #[error("too many wrong codes; request a new code")]
    GuessesExhausted,

    #[error("code has expired; request a new code")]
    ExpiredChallenge,

    #[error("no code has been sent to subject {0}")]
    NoActiveChallenge(SubjectId),

    #[error("network error: {0}")]
    Network(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("document snapshot changed since it was loaded; reload before submitting")]
    ConflictStaleSnapshot,

    #[error("no edits to submit")]
    NoChanges,

    #[error("no document snapshot loaded for subject {0}")]
    SnapshotNotLoaded(SubjectId),

    #[error("precondition not met: requires {required}, subject is {actual}")]
    PreconditionNotMet {
        required: VerificationStage,
        actual: VerificationStage,
    },

    #[error("document extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("face match score {score:.3} below threshold {threshold:.3}")]
    FaceMismatch { score: f64, threshold: f64 },

    #[error("sync session has been torn down")]
    SessionClosed,

    #[error("unexpected collaborator response: {0}")]
    Backend(String),
}

/// Discriminant of [`VerificationError`], stable across releases for wire use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimitExceeded,
    CooldownActive,
    InvalidCode,
    GuessesExhausted,
    ExpiredChallenge,
    NoActiveChallenge,
    NetworkError,
    ValidationError,
    ConflictStaleSnapshot,
    NoChanges,
    SnapshotNotLoaded,
    PreconditionNotMet,
    ExtractionFailed,
    FaceMismatch,
    SessionClosed,
    BackendError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RateLimitExceeded",
            Self::CooldownActive => "CooldownActive",
            Self::InvalidCode => "InvalidCode",
            Self::GuessesExhausted => "GuessesExhausted",
            Self::ExpiredChallenge => "ExpiredChallenge",
            Self::NoActiveChallenge => "NoActiveChallenge",
            Self::NetworkError => "NetworkError",
            Self::ValidationError => "ValidationError",
            Self::ConflictStaleSnapshot => "ConflictStaleSnapshot",
            Self::NoChanges => "NoChanges",
            Self::SnapshotNotLoaded => "SnapshotNotLoaded",
            Self::PreconditionNotMet => "PreconditionNotMet",
            Self::ExtractionFailed => "ExtractionFailed",
            Self::FaceMismatch => "FaceMismatch",
            Self::SessionClosed => "SessionClosed",
            Self::BackendError => "BackendError",
        }
    }
}

impl VerificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::CooldownActive { .. } => ErrorKind::CooldownActive,
            Self::InvalidCode { .. } => ErrorKind::InvalidCode,
            Self::GuessesExhausted => ErrorKind::GuessesExhausted,
            Self::ExpiredChallenge => ErrorKind::ExpiredChallenge,
            Self::NoActiveChallenge(_) => ErrorKind::NoActiveChallenge,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::ConflictStaleSnapshot => ErrorKind::ConflictStaleSnapshot,
            Self::NoChanges => ErrorKind::NoChanges,
            Self::SnapshotNotLoaded(_) => ErrorKind::SnapshotNotLoaded,
            Self::PreconditionNotMet { .. } => ErrorKind::PreconditionNotMet,
            Self::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            Self::FaceMismatch { .. } => ErrorKind::FaceMismatch,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::Backend(_) => ErrorKind::BackendError,
        }
    }

    /// Whether the subject can get past this error on their own (waiting,
    /// retyping, retrying). The send ceiling needs support intervention and a
    /// violated precondition is a caller bug.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::PreconditionNotMet { .. }
        )
    }
}

impl From<TypeError> for VerificationError {
    fn from(e: TypeError) -> Self {
        Self::Validation(e.to_string())
    }
}
