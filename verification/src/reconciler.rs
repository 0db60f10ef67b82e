//! Confirmation reconciler: merges a subject's corrections into the
//! machine-extracted document and submits only what changed.
//!
//! Baseline for every field is the last confirmed value, or the extracted one
//! before the first confirmation. `pending` only ever holds fields that exist
//! in the extraction and differ from their baseline.

use crate::backend::VerificationBackend;
use crate::error::VerificationError;
use crate::queue::SubjectQueue;
use ekyc_types::{DocumentFields, FieldName, SnapshotFingerprint, SubjectId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Longest value accepted for any field.
pub const MAX_FIELD_VALUE_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRecord {
    pub document_id: String,
    /// OCR output as last loaded.
    pub extracted: DocumentFields,
    /// Values the subject last accepted. Empty until the first confirmation.
    pub confirmed: DocumentFields,
    /// Unsent corrections.
    pub pending: DocumentFields,
    /// Fingerprint of the snapshot `extracted` came from.
    pub fingerprint: SnapshotFingerprint,
    pub confirmed_once: bool,
}

impl DocumentRecord {
    fn new(document_id: String, extracted: DocumentFields, fingerprint: SnapshotFingerprint) -> Self {
        Self {
            document_id,
            extracted,
            confirmed: DocumentFields::new(),
            pending: DocumentFields::new(),
            fingerprint,
            confirmed_once: false,
        }
    }

    pub fn baseline(&self, field: &FieldName) -> Option<&String> {
        self.confirmed.get(field).or_else(|| self.extracted.get(field))
    }

    /// Extracted values overlaid with confirmed values and then pending edits.
    pub fn merged_view(&self) -> DocumentFields {
        let mut merged = self.accepted_view();
        merged.extend(self.pending.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    fn accepted_view(&self) -> DocumentFields {
        let mut merged = self.extracted.clone();
        merged.extend(self.confirmed.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Pending entries that still differ from their baseline.
    fn delta(&self) -> DocumentFields {
        self.pending
            .iter()
            .filter(|(k, v)| self.baseline(k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop pending entries that no longer differ or no longer exist.
    fn prune_pending(&mut self) {
        let before = self.pending.len();
        let keep = self.delta();
        self.pending = keep
            .into_iter()
            .filter(|(k, _)| self.extracted.contains_key(k))
            .collect();
        if self.pending.len() < before {
            debug!(dropped = before - self.pending.len(), "pruned stale pending edits");
        }
    }
}

/// What `record_edit` did to the pending set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EditEffect {
    /// The value differs from the baseline and is now pending.
    Staged,
    /// The value equals the baseline; any pending edit was dropped.
    Reverted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    /// Send only the corrected fields.
    Edits,
    /// Accept the document. The first time this sends the full merged view.
    ConfirmAsIs,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Full snapshot confirmed for the first time.
    Confirmed { fields: DocumentFields },
    /// Partial update with exactly these fields.
    Updated { changed: DocumentFields },
    /// Nothing differed from what is already confirmed; nothing was sent.
    Unchanged,
}

pub struct ConfirmationReconciler {
    backend: Arc<dyn VerificationBackend>,
    queue: Arc<SubjectQueue>,
    records: Mutex<HashMap<SubjectId, DocumentRecord>>,
}

impl ConfirmationReconciler {
    pub fn new(backend: Arc<dyn VerificationBackend>, queue: Arc<SubjectQueue>) -> Self {
        Self {
            backend,
            queue,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<SubjectId, DocumentRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the extraction and make it the editing baseline.
    ///
    /// Reloading the same document keeps confirmed values and pending edits
    /// that still apply. A different document starts a fresh record.
    pub async fn load_snapshot(&self, subject: &SubjectId) -> Result<DocumentFields, VerificationError> {
        let _turn = self.queue.enter(subject).await;
        let snapshot = self.backend.fetch_document_snapshot(subject).await?;
        let fingerprint = snapshot.fingerprint();

        let mut records = self.records();
        let same_document = records
            .get(subject)
            .is_some_and(|r| r.document_id == snapshot.document_id);
        if let Some(record) = records.get_mut(subject).filter(|_| same_document) {
            if record.fingerprint != fingerprint {
                info!(%subject, document_id = %snapshot.document_id, "document extraction changed; rebasing edits");
            }
            record.extracted = snapshot.fields.clone();
            record.fingerprint = fingerprint;
            record.prune_pending();
        } else {
            debug!(%subject, document_id = %snapshot.document_id, fields = snapshot.fields.len(), "document snapshot loaded");
            records.insert(
                subject.clone(),
                DocumentRecord::new(snapshot.document_id.clone(), snapshot.fields.clone(), fingerprint),
            );
        }
        drop(records);
        Ok(snapshot.fields)
    }

    /// Stage a correction. Reverting to the baseline drops the pending entry.
    pub fn record_edit(
        &self,
        subject: &SubjectId,
        field: FieldName,
        value: &str,
    ) -> Result<EditEffect, VerificationError> {
        let mut records = self.records();
        let record = records
            .get_mut(subject)
            .ok_or_else(|| VerificationError::SnapshotNotLoaded(subject.clone()))?;
        if !record.extracted.contains_key(&field) {
            return Err(VerificationError::Validation(format!(
                "{field} is not a field of document {}",
                record.document_id
            )));
        }

        let value = value.trim();
        if record.baseline(&field).map(String::as_str) == Some(value) {
            record.pending.remove(&field);
            debug!(%subject, %field, "edit reverted to baseline");
            Ok(EditEffect::Reverted)
        } else {
            record.pending.insert(field, value.to_owned());
            Ok(EditEffect::Staged)
        }
    }

    /// Drop every pending edit. Returns how many were discarded.
    pub fn discard(&self, subject: &SubjectId) -> usize {
        self.records()
            .get_mut(subject)
            .map_or(0, |r| std::mem::take(&mut r.pending).len())
    }

    pub fn pending_edits(&self, subject: &SubjectId) -> DocumentFields {
        self.records()
            .get(subject)
            .map(|r| r.pending.clone())
            .unwrap_or_default()
    }

    pub fn record(&self, subject: &SubjectId) -> Option<DocumentRecord> {
        self.records().get(subject).cloned()
    }

    /// Submit the subject's corrections or confirm the document as-is.
    ///
    /// The extraction is re-fetched first; if it changed since it was loaded
    /// the submit fails with `ConflictStaleSnapshot` and nothing is sent.
    pub async fn submit(
        &self,
        subject: &SubjectId,
        mode: SubmitMode,
    ) -> Result<SubmitOutcome, VerificationError> {
        let _turn = self.queue.enter(subject).await;

        let (fingerprint, first_confirmation, pending) = {
            let records = self.records();
            let record = records
                .get(subject)
                .ok_or_else(|| VerificationError::SnapshotNotLoaded(subject.clone()))?;
            (record.fingerprint, !record.confirmed_once, record.pending.clone())
        };

        match mode {
            SubmitMode::Edits if pending.is_empty() => return Err(VerificationError::NoChanges),
            SubmitMode::ConfirmAsIs if !first_confirmation && pending.is_empty() => {
                debug!(%subject, "document already confirmed; nothing to send");
                return Ok(SubmitOutcome::Unchanged);
            }
            _ => {}
        }
        for (field, value) in &pending {
            validate_value(field, value)?;
        }

        let current = self.backend.fetch_document_snapshot(subject).await?;
        if current.fingerprint() != fingerprint {
            warn!(%subject, document_id = %current.document_id, "document changed since it was loaded");
            return Err(VerificationError::ConflictStaleSnapshot);
        }

        if mode == SubmitMode::ConfirmAsIs && first_confirmation {
            let fields = self
                .record(subject)
                .map(|r| r.merged_view())
                .ok_or_else(|| VerificationError::SnapshotNotLoaded(subject.clone()))?;
            self.backend.confirm_document(subject, &fields).await?;
            self.commit(subject, &fields, &pending);
            info!(%subject, fields = fields.len(), "document confirmed");
            return Ok(SubmitOutcome::Confirmed { fields });
        }

        let delta = self
            .record(subject)
            .map(|r| {
                let mut probe = r.clone();
                probe.pending = pending.clone();
                probe.delta()
            })
            .ok_or_else(|| VerificationError::SnapshotNotLoaded(subject.clone()))?;
        if delta.is_empty() {
            debug!(%subject, "pending edits match confirmed values; skipping update");
            if let Some(record) = self.records().get_mut(subject) {
                record.prune_pending();
            }
            return Ok(SubmitOutcome::Unchanged);
        }

        self.backend.update_document_fields(subject, &delta).await?;
        self.commit(subject, &delta, &pending);
        info!(
            %subject,
            fields = ?delta.keys().map(FieldName::as_str).collect::<Vec<_>>(),
            "document fields updated"
        );
        Ok(SubmitOutcome::Updated { changed: delta })
    }

    /// Fold `accepted` into the confirmed values and drop the pending entries
    /// that were part of this submit. Edits staged while the request was in
    /// flight survive.
    fn commit(&self, subject: &SubjectId, accepted: &DocumentFields, submitted: &DocumentFields) {
        let mut records = self.records();
        let Some(record) = records.get_mut(subject) else {
            return;
        };
        let mut confirmed = record.accepted_view();
        confirmed.extend(accepted.iter().map(|(k, v)| (k.clone(), v.clone())));
        record.confirmed = confirmed;
        record.confirmed_once = true;
        record
            .pending
            .retain(|k, v| submitted.get(k) != Some(&*v));
        record.prune_pending();
    }
}

fn validate_value(field: &FieldName, value: &str) -> Result<(), VerificationError> {
    if value.is_empty() {
        return Err(VerificationError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > MAX_FIELD_VALUE_LEN {
        return Err(VerificationError::Validation(format!(
            "{field} exceeds {MAX_FIELD_VALUE_LEN} characters"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(VerificationError::Validation(format!(
            "{field} contains control characters"
        )));
    }
    if field.is_date() && !is_iso_date(value) {
        return Err(VerificationError::Validation(format!(
            "{field} must be a date in YYYY-MM-DD form"
        )));
    }
    Ok(())
}

fn is_iso_date(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| -> Option<u32> {
        let part = s.get(r)?;
        if part.bytes().all(|c| c.is_ascii_digit()) {
            part.parse().ok()
        } else {
            None
        }
    };
    matches!(
        (digits(0..4), digits(5..7), digits(8..10)),
        (Some(_), Some(1..=12), Some(1..=31))
    )
}
