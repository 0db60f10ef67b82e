//! Nullable system of record: programmable status, extraction and face
//! scoring, with every write recorded.

use async_trait::async_trait;
use ekyc_types::{CaptureRef, DocumentFields, DocumentSnapshot, SubjectId, VerificationProfile};
use ekyc_verification::{ExtractionResult, FaceMatchResult, VerificationBackend, VerificationError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A test backend. Status fetches can be held open to exercise
/// deduplication; see [`hold_status_fetches`](Self::hold_status_fetches).
#[derive(Debug)]
pub struct NullBackend {
    profile: Mutex<Option<VerificationProfile>>,
    snapshot: Mutex<Option<DocumentSnapshot>>,
    extraction: Mutex<ExtractionResult>,
    face: Mutex<FaceMatchResult>,
    status_failures: Mutex<VecDeque<VerificationError>>,
    write_failures: Mutex<VecDeque<VerificationError>>,
    confirms: Mutex<Vec<(SubjectId, DocumentFields)>>,
    patches: Mutex<Vec<(SubjectId, DocumentFields)>>,
    status_fetches: AtomicUsize,
    active_fetches: AtomicUsize,
    peak_fetches: AtomicUsize,
    face_calls: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl NullBackend {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            profile: Mutex::new(None),
            snapshot: Mutex::new(None),
            extraction: Mutex::new(ExtractionResult {
                document_id: "doc-1".into(),
                succeeded: true,
                reason: None,
            }),
            face: Mutex::new(FaceMatchResult {
                matched: true,
                score: 0.93,
            }),
            status_failures: Mutex::new(VecDeque::new()),
            write_failures: Mutex::new(VecDeque::new()),
            confirms: Mutex::new(Vec::new()),
            patches: Mutex::new(Vec::new()),
            status_fetches: AtomicUsize::new(0),
            active_fetches: AtomicUsize::new(0),
            peak_fetches: AtomicUsize::new(0),
            face_calls: AtomicUsize::new(0),
            gate,
        }
    }

    /// Profile returned by status fetches. Without one, a fresh `Unverified`
    /// profile for the requested subject is returned.
    pub fn set_profile(&self, profile: VerificationProfile) {
        *lock(&self.profile) = Some(profile);
    }

    pub fn set_snapshot(&self, snapshot: DocumentSnapshot) {
        *lock(&self.snapshot) = Some(snapshot);
    }

    pub fn set_extraction(&self, extraction: ExtractionResult) {
        *lock(&self.extraction) = extraction;
    }

    pub fn set_face_result(&self, result: FaceMatchResult) {
        *lock(&self.face) = result;
    }

    pub fn fail_next_status(&self, error: VerificationError) {
        lock(&self.status_failures).push_back(error);
    }

    /// Make the next confirm or patch fail with `error`.
    pub fn fail_next_write(&self, error: VerificationError) {
        lock(&self.write_failures).push_back(error);
    }

    /// Block status fetches until [`release_status_fetches`](Self::release_status_fetches).
    pub fn hold_status_fetches(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_status_fetches(&self) {
        self.gate.send_replace(true);
    }

    pub fn status_fetches(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    /// Highest number of status fetches ever in flight at once.
    pub fn peak_concurrent_fetches(&self) -> usize {
        self.peak_fetches.load(Ordering::SeqCst)
    }

    /// Full-snapshot confirmations received, in order.
    pub fn confirms(&self) -> Vec<(SubjectId, DocumentFields)> {
        lock(&self.confirms).clone()
    }

    /// Partial updates received, in order.
    pub fn patches(&self) -> Vec<(SubjectId, DocumentFields)> {
        lock(&self.patches).clone()
    }

    pub fn face_calls(&self) -> usize {
        self.face_calls.load(Ordering::SeqCst)
    }

    fn take_write_failure(&self) -> Result<(), VerificationError> {
        match lock(&self.write_failures).pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationBackend for NullBackend {
    async fn fetch_status(&self, subject: &SubjectId) -> Result<VerificationProfile, VerificationError> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        let active = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_fetches.fetch_max(active, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = gate.wait_for(|open| *open).await;
        self.active_fetches.fetch_sub(1, Ordering::SeqCst);

        if let Some(e) = lock(&self.status_failures).pop_front() {
            return Err(e);
        }
        Ok(lock(&self.profile)
            .clone()
            .unwrap_or_else(|| VerificationProfile::new(subject.clone())))
    }

    async fn capture_document(
        &self,
        _subject: &SubjectId,
        _capture: &CaptureRef,
    ) -> Result<ExtractionResult, VerificationError> {
        Ok(lock(&self.extraction).clone())
    }

    async fn fetch_document_snapshot(&self, subject: &SubjectId) -> Result<DocumentSnapshot, VerificationError> {
        lock(&self.snapshot)
            .clone()
            .ok_or_else(|| VerificationError::Backend(format!("no document snapshot for {subject}")))
    }

    async fn confirm_document(&self, subject: &SubjectId, fields: &DocumentFields) -> Result<(), VerificationError> {
        self.take_write_failure()?;
        lock(&self.confirms).push((subject.clone(), fields.clone()));
        Ok(())
    }

    async fn update_document_fields(
        &self,
        subject: &SubjectId,
        changed: &DocumentFields,
    ) -> Result<(), VerificationError> {
        self.take_write_failure()?;
        lock(&self.patches).push((subject.clone(), changed.clone()));
        Ok(())
    }

    async fn face_match(
        &self,
        _subject: &SubjectId,
        _live_capture: &CaptureRef,
    ) -> Result<FaceMatchResult, VerificationError> {
        self.face_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*lock(&self.face))
    }
}
