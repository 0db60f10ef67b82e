//! Per-subject verification progress.

use crate::subject::SubjectId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered verification stages. Later variants compare greater.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VerificationStage {
    Unverified,
    PhoneVerified,
    DocumentCaptured,
    DocumentConfirmed,
    /// Face match succeeded; terminal.
    FullyVerified,
}

impl VerificationStage {
    pub const ALL: [VerificationStage; 5] = [
        Self::Unverified,
        Self::PhoneVerified,
        Self::DocumentCaptured,
        Self::DocumentConfirmed,
        Self::FullyVerified,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FullyVerified)
    }

    /// The stage directly after this one, `None` when terminal.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Unverified => Some(Self::PhoneVerified),
            Self::PhoneVerified => Some(Self::DocumentCaptured),
            Self::DocumentCaptured => Some(Self::DocumentConfirmed),
            Self::DocumentConfirmed => Some(Self::FullyVerified),
            Self::FullyVerified => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::PhoneVerified => "phone_verified",
            Self::DocumentCaptured => "document_captured",
            Self::DocumentConfirmed => "document_confirmed",
            Self::FullyVerified => "fully_verified",
        }
    }
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milestones reached by one subject. Every flag is monotonic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationProfile {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub document_captured: bool,
    #[serde(default)]
    pub document_confirmed: bool,
    #[serde(default)]
    pub face_verified: bool,
    #[serde(default)]
    pub phone_verified_at: Option<Timestamp>,
    #[serde(default)]
    pub document_captured_at: Option<Timestamp>,
    #[serde(default)]
    pub document_confirmed_at: Option<Timestamp>,
    #[serde(default)]
    pub face_verified_at: Option<Timestamp>,
    /// Reference to the captured document, once there is one.
    #[serde(default)]
    pub document_id: Option<String>,
}

impl VerificationProfile {
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            phone_verified: false,
            document_captured: false,
            document_confirmed: false,
            face_verified: false,
            phone_verified_at: None,
            document_captured_at: None,
            document_confirmed_at: None,
            face_verified_at: None,
            document_id: None,
        }
    }

    /// The furthest stage reached through an unbroken chain of milestones.
    ///
    /// A milestone set out of order (e.g. document captured without phone
    /// verification) does not count toward the stage.
    pub fn stage(&self) -> VerificationStage {
        let chain = [
            self.phone_verified,
            self.document_captured,
            self.document_confirmed,
            self.face_verified,
        ];
        let reached = chain.iter().take_while(|&&m| m).count();
        VerificationStage::ALL[reached]
    }

    pub fn is_fully_verified(&self) -> bool {
        self.stage().is_terminal()
    }

    /// Check the structural invariant: a face match needs a reference document.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.face_verified && !self.document_captured {
            return Err(format!(
                "subject {} is face-verified without a captured document",
                self.subject_id
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> VerificationProfile {
        VerificationProfile::new(SubjectId::parse("s-1").unwrap())
    }

    #[test]
    fn stage_follows_unbroken_chain() {
        let mut p = profile();
        assert_eq!(p.stage(), VerificationStage::Unverified);
        p.phone_verified = true;
        assert_eq!(p.stage(), VerificationStage::PhoneVerified);
        p.document_captured = true;
        p.document_confirmed = true;
        assert_eq!(p.stage(), VerificationStage::DocumentConfirmed);
        p.face_verified = true;
        assert!(p.is_fully_verified());
    }

    #[test]
    fn out_of_order_milestones_do_not_count() {
        let mut p = profile();
        p.document_captured = true;
        p.face_verified = true;
        assert_eq!(p.stage(), VerificationStage::Unverified);
    }

    #[test]
    fn face_without_document_violates_invariant() {
        let mut p = profile();
        p.face_verified = true;
        assert!(p.check_invariants().is_err());
        p.document_captured = true;
        assert!(p.check_invariants().is_ok());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(VerificationStage::Unverified < VerificationStage::PhoneVerified);
        assert!(VerificationStage::DocumentConfirmed < VerificationStage::FullyVerified);
        assert_eq!(VerificationStage::FullyVerified.next(), None);
    }

    #[test]
    fn deserializes_camel_case_with_missing_milestones() {
        let json = r#"{"subjectId":"s-9","phoneVerified":true}"#;
        let p: VerificationProfile = serde_json::from_str(json).unwrap();
        assert_eq!(p.stage(), VerificationStage::PhoneVerified);
        assert_eq!(p.document_id, None);
    }
}
