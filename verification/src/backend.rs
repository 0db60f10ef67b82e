//! The system of record: status, document extraction, and face scoring.

use crate::error::VerificationError;
use async_trait::async_trait;
use ekyc_types::{CaptureRef, DocumentFields, DocumentSnapshot, SubjectId, VerificationProfile};
use serde::{Deserialize, Serialize};

/// Result of submitting a document capture to the OCR engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: String,
    pub succeeded: bool,
    /// Provider explanation when extraction did not succeed.
    pub reason: Option<String>,
}

/// Result of a live face match against the captured document.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceMatchResult {
    pub matched: bool,
    pub score: f64,
}

/// Remote verification backend. Every call returns a discriminated result;
/// transport failures surface as [`VerificationError::Network`].
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    /// `GET verification-status(subjectId)`
    async fn fetch_status(&self, subject: &SubjectId)
        -> Result<VerificationProfile, VerificationError>;

    /// `POST document-capture(subjectId, capture)`
    async fn capture_document(
        &self,
        subject: &SubjectId,
        capture: &CaptureRef,
    ) -> Result<ExtractionResult, VerificationError>;

    /// `GET document-snapshot(subjectId)`
    async fn fetch_document_snapshot(
        &self,
        subject: &SubjectId,
    ) -> Result<DocumentSnapshot, VerificationError>;

    /// `POST confirm-document(subjectId, fields)`: full snapshot, first confirmation.
    async fn confirm_document(
        &self,
        subject: &SubjectId,
        fields: &DocumentFields,
    ) -> Result<(), VerificationError>;

    /// `PATCH update-document-fields(subjectId, changedFields)`: partial update.
    async fn update_document_fields(
        &self,
        subject: &SubjectId,
        changed: &DocumentFields,
    ) -> Result<(), VerificationError>;

    /// `POST face-match(subjectId, liveCapture)`
    async fn face_match(
        &self,
        subject: &SubjectId,
        live_capture: &CaptureRef,
    ) -> Result<FaceMatchResult, VerificationError>;
}
