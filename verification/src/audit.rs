//! Audit trail of every send and verify attempt.
//!
//! Entries are kept in a bounded in-memory ring and mirrored to `tracing`
//! under the `ekyc::audit` target so a log shipper can persist them.

use ekyc_types::{SubjectId, Timestamp};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Default number of entries retained in memory.
pub const DEFAULT_AUDIT_CAPACITY: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    CodeSent,
    SendRejected,
    SendFailed,
    CodeVerified,
    VerifyRejected,
    VerifyFailed,
    ChallengeReset,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeSent => "code_sent",
            Self::SendRejected => "send_rejected",
            Self::SendFailed => "send_failed",
            Self::CodeVerified => "code_verified",
            Self::VerifyRejected => "verify_rejected",
            Self::VerifyFailed => "verify_failed",
            Self::ChallengeReset => "challenge_reset",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub at: Timestamp,
    pub subject: SubjectId,
    pub action: AuditAction,
    /// Masked destination; never the full number.
    pub destination: Option<String>,
    /// Short machine-readable outcome, e.g. `ok` or an error kind.
    pub outcome: String,
}

pub struct AuditTrail {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        info!(
            target: "ekyc::audit",
            at = entry.at.as_secs(),
            subject = %entry.subject,
            action = entry.action.as_str(),
            destination = entry.destination.as_deref().unwrap_or("-"),
            outcome = %entry.outcome,
            "audit"
        );
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All retained entries for one subject, oldest first.
    pub fn entries_for(&self, subject: &SubjectId) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|e| &e.subject == subject)
            .cloned()
            .collect()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject: &str, at: u64, action: AuditAction) -> AuditEntry {
        AuditEntry {
            at: Timestamp::new(at),
            subject: SubjectId::parse(subject).unwrap(),
            action,
            destination: None,
            outcome: "ok".into(),
        }
    }

    #[test]
    fn bounded_ring_drops_oldest() {
        let trail = AuditTrail::with_capacity(2);
        trail.record(entry("a", 1, AuditAction::CodeSent));
        trail.record(entry("a", 2, AuditAction::CodeVerified));
        trail.record(entry("b", 3, AuditAction::CodeSent));
        assert_eq!(trail.len(), 2);
        let recent = trail.recent(10);
        assert_eq!(recent[0].at, Timestamp::new(2));
        assert_eq!(recent[1].at, Timestamp::new(3));
    }

    #[test]
    fn filters_by_subject() {
        let trail = AuditTrail::new();
        trail.record(entry("a", 1, AuditAction::CodeSent));
        trail.record(entry("b", 2, AuditAction::CodeSent));
        trail.record(entry("a", 3, AuditAction::VerifyRejected));
        let a = trail.entries_for(&SubjectId::parse("a").unwrap());
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].action, AuditAction::VerifyRejected);
    }
}
