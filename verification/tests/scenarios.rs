//! End-to-end flows through `VerificationService` with nullable collaborators.

use ekyc_nullables::{NullBackend, NullClock, NullCredentialStore, NullOtpGateway};
use ekyc_types::{
    CaptureRef, DocumentFields, DocumentSnapshot, FieldName, OtpCode, PhoneNumber, SubjectId,
    VerificationParams, VerificationProfile, VerificationStage,
};
use ekyc_verification::{
    ChallengeStatus, Collaborators, ExtractionResult, FaceMatchResult, ProgressEvent, SubmitMode,
    SubmitOutcome, SyncOptions, VerificationError, VerificationService,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    service: Arc<VerificationService>,
    clock: Arc<NullClock>,
    otp: Arc<NullOtpGateway>,
    backend: Arc<NullBackend>,
    credentials: Arc<NullCredentialStore>,
}

fn harness() -> Harness {
    harness_with(VerificationParams::default())
}

fn harness_with(params: VerificationParams) -> Harness {
    ekyc_utils::init_test_tracing();
    let clock = Arc::new(NullClock::new(0));
    let otp = Arc::new(NullOtpGateway::new());
    let backend = Arc::new(NullBackend::new());
    let credentials = Arc::new(NullCredentialStore::new());
    let service = VerificationService::new(
        params,
        Collaborators {
            otp: otp.clone(),
            backend: backend.clone(),
            credentials: credentials.clone(),
            clock: clock.clone(),
        },
    )
    .unwrap();
    Harness {
        service: Arc::new(service),
        clock,
        otp,
        backend,
        credentials,
    }
}

fn subject() -> SubjectId {
    SubjectId::parse("subject-42").unwrap()
}

fn phone() -> PhoneNumber {
    PhoneNumber::parse("+84 912 345 678").unwrap()
}

fn code(s: &str) -> OtpCode {
    OtpCode::parse(s).unwrap()
}

fn capture(s: &str) -> CaptureRef {
    CaptureRef::parse(s).unwrap()
}

fn fields(pairs: &[(&str, &str)]) -> DocumentFields {
    pairs
        .iter()
        .map(|(k, v)| (FieldName::parse(*k).unwrap(), v.to_string()))
        .collect()
}

async fn phone_verified(h: &Harness) {
    h.service.request_code(&subject(), &phone()).await.unwrap();
    h.service.verify_code(&subject(), &code("123456")).await.unwrap();
}

async fn document_captured(h: &Harness) {
    phone_verified(h).await;
    h.service
        .capture_document(&subject(), &capture("upload-1"))
        .await
        .unwrap();
}

async fn document_confirmed(h: &Harness) {
    document_captured(h).await;
    h.backend.set_snapshot(DocumentSnapshot {
        document_id: "doc-1".into(),
        fields: fields(&[("name", "A"), ("dob", "1990-01-01")]),
    });
    h.service.load_document(&subject()).await.unwrap();
    h.service
        .submit_document(&subject(), SubmitMode::ConfirmAsIs)
        .await
        .unwrap();
}

fn fully_verified_profile() -> VerificationProfile {
    let mut p = VerificationProfile::new(subject());
    p.phone_verified = true;
    p.document_captured = true;
    p.document_confirmed = true;
    p.face_verified = true;
    p.document_id = Some("doc-1".into());
    p
}

// ── Scenario 1 ──────────────────────────────────────────────────────────

#[tokio::test]
async fn resend_respects_the_cooldown() {
    let h = harness();

    let ticket = h.service.request_code(&subject(), &phone()).await.unwrap();
    assert_eq!(ticket.cooldown_secs, 60);
    assert_eq!(h.service.challenge(&subject()).unwrap().attempt_count, 1);

    h.clock.set(30);
    assert_eq!(
        h.service.request_code(&subject(), &phone()).await,
        Err(VerificationError::CooldownActive { seconds_remaining: 30 })
    );

    h.clock.set(61);
    h.service.request_code(&subject(), &phone()).await.unwrap();
    assert_eq!(h.service.challenge(&subject()).unwrap().attempt_count, 2);
    assert_eq!(h.otp.send_count(), 2);
}

// ── Scenario 2 ──────────────────────────────────────────────────────────

#[tokio::test]
async fn sixth_send_hits_the_ceiling_until_support_reset() {
    let h = harness();
    for _ in 0..5 {
        h.service.request_code(&subject(), &phone()).await.unwrap();
        h.clock.advance(60);
    }

    let blocked = h.service.request_code(&subject(), &phone()).await;
    assert_eq!(
        blocked,
        Err(VerificationError::RateLimitExceeded { attempts: 5, max: 5 })
    );
    assert!(!blocked.unwrap_err().is_recoverable());

    h.clock.advance(10_000);
    assert!(matches!(
        h.service.request_code(&subject(), &phone()).await,
        Err(VerificationError::RateLimitExceeded { .. })
    ));
    assert_eq!(h.service.challenge(&subject()).unwrap().status, ChallengeStatus::Blocked);
    assert_eq!(h.otp.send_count(), 5);

    assert!(h.service.reset_challenge(&subject()).await);
    h.service.request_code(&subject(), &phone()).await.unwrap();
    assert_eq!(h.otp.send_count(), 6);
}

// ── Scenario 3 ──────────────────────────────────────────────────────────

#[tokio::test]
async fn correct_code_verifies_once_and_is_idempotent() {
    let h = harness();
    h.service.request_code(&subject(), &phone()).await.unwrap();

    let stage = h.service.verify_code(&subject(), &code("123456")).await.unwrap();
    assert_eq!(stage, VerificationStage::PhoneVerified);
    assert_eq!(h.service.challenge(&subject()).unwrap().status, ChallengeStatus::Verified);

    let again = h.service.verify_code(&subject(), &code("123456")).await.unwrap();
    assert_eq!(again, VerificationStage::PhoneVerified);
    assert_eq!(h.otp.verify_count(), 1);
    assert!(h.service.status(&subject()).phone_verified);
}

// ── Scenario 4 ──────────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_code_then_expiry() {
    let h = harness();
    h.service.request_code(&subject(), &phone()).await.unwrap();

    assert_eq!(
        h.service.verify_code(&subject(), &code("000000")).await,
        Err(VerificationError::InvalidCode { guesses_remaining: 4 })
    );

    h.clock.advance(301);
    assert_eq!(
        h.service.verify_code(&subject(), &code("123456")).await,
        Err(VerificationError::ExpiredChallenge)
    );
    // Rejected before reaching the channel.
    assert_eq!(h.otp.verify_count(), 1);
    assert_eq!(h.service.status(&subject()).stage(), VerificationStage::Unverified);
}

#[tokio::test]
async fn guess_ceiling_requires_a_fresh_send() {
    let h = harness_with(VerificationParams {
        max_code_guesses: 2,
        ..VerificationParams::default()
    });
    h.service.request_code(&subject(), &phone()).await.unwrap();

    for _ in 0..2 {
        assert!(matches!(
            h.service.verify_code(&subject(), &code("000000")).await,
            Err(VerificationError::InvalidCode { .. })
        ));
    }
    assert_eq!(
        h.service.verify_code(&subject(), &code("123456")).await,
        Err(VerificationError::GuessesExhausted)
    );

    h.clock.advance(60);
    h.service.request_code(&subject(), &phone()).await.unwrap();
    assert!(h.service.verify_code(&subject(), &code("123456")).await.is_ok());
}

#[tokio::test]
async fn failed_dispatch_consumes_no_attempt() {
    let h = harness();
    h.otp
        .fail_next_send(VerificationError::Network("connection reset".into()));
    assert!(matches!(
        h.service.request_code(&subject(), &phone()).await,
        Err(VerificationError::Network(_))
    ));
    assert!(h.service.challenge(&subject()).is_none());

    // No cooldown either: the user may retry at once.
    h.service.request_code(&subject(), &phone()).await.unwrap();
    assert_eq!(h.service.challenge(&subject()).unwrap().attempt_count, 1);
}

#[tokio::test]
async fn verifying_does_not_reopen_the_resend_window() {
    let h = harness();
    h.service.request_code(&subject(), &phone()).await.unwrap();
    h.clock.set(1);
    h.service.verify_code(&subject(), &code("123456")).await.unwrap();

    h.clock.set(2);
    assert_eq!(
        h.service.request_code(&subject(), &phone()).await,
        Err(VerificationError::CooldownActive { seconds_remaining: 58 })
    );
    // The verified challenge stands until a new code actually goes out.
    assert_eq!(h.service.challenge(&subject()).unwrap().status, ChallengeStatus::Verified);
    assert_eq!(h.otp.send_count(), 1);
}

#[tokio::test]
async fn send_verify_loop_is_still_bounded_by_cooldown_and_ceiling() {
    let h = harness();
    for i in 0..10 {
        h.clock.set(2 * i);
        if h.service.request_code(&subject(), &phone()).await.is_ok() {
            h.clock.set(2 * i + 1);
            h.service.verify_code(&subject(), &code("123456")).await.unwrap();
        }
    }
    assert_eq!(h.otp.send_count(), 1);

    // Renewed challenges share one ceiling.
    for i in 1..10 {
        h.clock.set(i * 60);
        let _ = h.service.request_code(&subject(), &phone()).await;
        let _ = h.service.verify_code(&subject(), &code("123456")).await;
    }
    assert_eq!(h.otp.send_count(), 5);
    assert!(matches!(
        h.service.request_code(&subject(), &phone()).await,
        Err(VerificationError::RateLimitExceeded { attempts: 5, max: 5 })
    ));
}

#[tokio::test]
async fn fresh_code_after_verification_and_cooldown() {
    let h = harness();
    phone_verified(&h).await;
    h.clock.set(60);
    let ticket = h.service.request_code(&subject(), &phone()).await.unwrap();
    assert_eq!(ticket.attempts_remaining, 3);

    let challenge = h.service.challenge(&subject()).unwrap();
    assert_eq!(challenge.status, ChallengeStatus::Sent);
    assert_eq!(challenge.attempt_count, 2);
}

#[tokio::test]
async fn rejected_sends_leave_no_state_behind() {
    let h = harness();
    for i in 0..100 {
        let subject = SubjectId::parse(format!("subject-{i}")).unwrap();
        h.otp
            .fail_next_send(VerificationError::Network("connection reset".into()));
        assert!(h.service.request_code(&subject, &phone()).await.is_err());
        assert!(h.service.challenge(&subject).is_none());
    }
    assert_eq!(h.service.active_subjects(), 0);

    document_captured(&h).await;
    assert_eq!(h.service.active_subjects(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn verify_result_is_not_affected_by_a_queued_resend() {
    for _ in 0..20 {
        let h = harness();
        h.service.request_code(&subject(), &phone()).await.unwrap();
        h.clock.set(60);
        h.otp.delay_verifies(Duration::from_millis(5));

        let verify = {
            let service = h.service.clone();
            tokio::spawn(async move { service.verify_code(&subject(), &code("123456")).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        let resend = {
            let service = h.service.clone();
            tokio::spawn(async move { service.request_code(&subject(), &phone()).await })
        };

        assert_eq!(verify.await.unwrap(), Ok(VerificationStage::PhoneVerified));
        resend.await.unwrap().unwrap();
        assert_eq!(h.service.status(&subject()).stage(), VerificationStage::PhoneVerified);
    }
}

#[tokio::test]
async fn provider_cooldown_can_only_lengthen_the_wait() {
    let h = harness();
    h.otp.set_provider_cooldown(Some(90));
    let ticket = h.service.request_code(&subject(), &phone()).await.unwrap();
    assert_eq!(ticket.cooldown_secs, 90);

    h.clock.set(61);
    assert_eq!(
        h.service.request_code(&subject(), &phone()).await,
        Err(VerificationError::CooldownActive { seconds_remaining: 29 })
    );
}

#[tokio::test]
async fn every_attempt_is_audited_with_a_masked_destination() {
    let h = harness();
    h.service.request_code(&subject(), &phone()).await.unwrap();
    let _ = h.service.request_code(&subject(), &phone()).await;
    let _ = h.service.verify_code(&subject(), &code("000000")).await;
    h.service.verify_code(&subject(), &code("123456")).await.unwrap();

    let entries = h.service.audit_entries(&subject());
    assert_eq!(entries.len(), 4);
    for entry in entries.iter().filter_map(|e| e.destination.as_deref()) {
        assert!(!entry.contains("912345"), "destination leaked: {entry}");
    }
    assert_eq!(entries[1].outcome, "CooldownActive");
}

// ── Scenario 5 ──────────────────────────────────────────────────────────

#[tokio::test]
async fn only_the_corrected_field_is_submitted() {
    let h = harness();
    document_captured(&h).await;
    h.backend.set_snapshot(DocumentSnapshot {
        document_id: "doc-1".into(),
        fields: fields(&[("name", "A"), ("dob", "1990-01-01")]),
    });

    let baseline = h.service.load_document(&subject()).await.unwrap();
    assert_eq!(baseline, fields(&[("name", "A"), ("dob", "1990-01-01")]));

    h.service
        .edit_field(&subject(), FieldName::parse("name").unwrap(), "B")
        .unwrap();
    let submission = h
        .service
        .submit_document(&subject(), SubmitMode::Edits)
        .await
        .unwrap();

    assert_eq!(
        submission.outcome,
        SubmitOutcome::Updated { changed: fields(&[("name", "B")]) }
    );
    assert_eq!(submission.stage, VerificationStage::DocumentConfirmed);
    assert_eq!(h.backend.patches(), vec![(subject(), fields(&[("name", "B")]))]);
    assert!(h.backend.confirms().is_empty());

    let record = h.service.document(&subject()).unwrap();
    assert!(record.pending.is_empty());
    assert_eq!(record.confirmed, fields(&[("name", "B"), ("dob", "1990-01-01")]));
}

#[tokio::test]
async fn document_steps_require_their_predecessors() {
    let h = harness();
    assert!(matches!(
        h.service.capture_document(&subject(), &capture("upload-1")).await,
        Err(VerificationError::PreconditionNotMet {
            required: VerificationStage::PhoneVerified,
            actual: VerificationStage::Unverified,
        })
    ));

    phone_verified(&h).await;
    assert!(matches!(
        h.service.load_document(&subject()).await,
        Err(VerificationError::PreconditionNotMet { .. })
    ));
}

#[tokio::test]
async fn failed_extraction_does_not_advance() {
    let h = harness();
    phone_verified(&h).await;
    h.backend.set_extraction(ExtractionResult {
        document_id: "doc-9".into(),
        succeeded: false,
        reason: Some("glare".into()),
    });
    assert_eq!(
        h.service.capture_document(&subject(), &capture("upload-1")).await,
        Err(VerificationError::ExtractionFailed("glare".into()))
    );
    assert_eq!(h.service.status(&subject()).stage(), VerificationStage::PhoneVerified);
}

// ── Face match ──────────────────────────────────────────────────────────

#[tokio::test]
async fn face_match_is_refused_until_document_is_confirmed() {
    for setup in 0..3 {
        let h = harness();
        match setup {
            1 => phone_verified(&h).await,
            2 => document_captured(&h).await,
            _ => {}
        }
        assert!(matches!(
            h.service.request_face_match(&subject(), &capture("selfie")).await,
            Err(VerificationError::PreconditionNotMet {
                required: VerificationStage::DocumentConfirmed,
                ..
            })
        ));
        assert_eq!(h.backend.face_calls(), 0);
    }
}

#[tokio::test]
async fn face_match_completes_verification() {
    let h = harness();
    let mut events = h.service.subscribe();
    document_confirmed(&h).await;

    let report = h
        .service
        .request_face_match(&subject(), &capture("selfie"))
        .await
        .unwrap();
    assert!(report.matched);
    assert_eq!(report.score, Some(0.93));
    assert_eq!(report.stage, VerificationStage::FullyVerified);
    assert_eq!(h.service.fully_verified_count(), 1);

    // A repeat does not call the scorer again.
    let again = h
        .service
        .request_face_match(&subject(), &capture("selfie"))
        .await
        .unwrap();
    assert_eq!(again.score, None);
    assert_eq!(h.backend.face_calls(), 1);

    let mut stages = Vec::new();
    while let Ok(ProgressEvent::StageAdvanced { to, .. }) = events.try_recv() {
        stages.push(to);
    }
    assert_eq!(
        stages,
        vec![
            VerificationStage::PhoneVerified,
            VerificationStage::DocumentCaptured,
            VerificationStage::DocumentConfirmed,
            VerificationStage::FullyVerified,
        ]
    );
}

#[tokio::test]
async fn low_score_is_a_mismatch() {
    let h = harness();
    document_confirmed(&h).await;
    h.backend.set_face_result(FaceMatchResult {
        matched: true,
        score: 0.41,
    });
    assert!(matches!(
        h.service.request_face_match(&subject(), &capture("selfie")).await,
        Err(VerificationError::FaceMismatch { .. })
    ));
    h.backend.set_face_result(FaceMatchResult {
        matched: false,
        score: 0.95,
    });
    assert!(matches!(
        h.service.request_face_match(&subject(), &capture("selfie")).await,
        Err(VerificationError::FaceMismatch { .. })
    ));
    assert_eq!(h.service.status(&subject()).stage(), VerificationStage::DocumentConfirmed);
}

// ── Status sync and Scenario 6 ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_issue_one_fetch() {
    let h = harness();
    h.backend.hold_status_fetches();

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let service = h.service.clone();
        waiters.push(tokio::spawn(async move { service.refresh_status(&subject()).await }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.backend.release_status_fetches();

    for w in waiters {
        assert!(w.await.unwrap().is_ok());
    }
    assert_eq!(h.backend.status_fetches(), 1);
    assert_eq!(h.backend.peak_concurrent_fetches(), 1);

    // A later refresh fetches again.
    h.service.refresh_status(&subject()).await.unwrap();
    assert_eq!(h.backend.status_fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn teardown_before_countdown_ends_never_redirects() {
    let h = harness();
    h.backend.set_profile(fully_verified_profile());
    let redirects = Arc::new(AtomicUsize::new(0));
    let r = redirects.clone();

    let session = h.service.attach_session(
        subject(),
        SyncOptions::standard(h.service.params()),
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
    );
    let profile = session.mount().await.unwrap();
    assert!(profile.is_fully_verified());
    assert_eq!(session.countdown_remaining(), Some(5));

    tokio::time::sleep(Duration::from_secs(2)).await;
    drop(session);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(redirects.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn legacy_flow_redirects_once_after_fifteen_seconds() {
    let h = harness();
    h.backend.set_profile(fully_verified_profile());
    let redirects = Arc::new(AtomicUsize::new(0));
    let r = redirects.clone();

    let session = h.service.attach_session(
        subject(),
        SyncOptions::legacy(h.service.params()),
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
    );
    session.mount().await.unwrap();
    tokio::time::sleep(Duration::from_secs(14)).await;
    assert_eq!(redirects.load(Ordering::SeqCst), 0);
    session.focus().await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(redirects.load(Ordering::SeqCst), 1);
    session.refresh().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(redirects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn polling_picks_up_remote_progress() {
    let h = harness();
    let redirected = Arc::new(AtomicUsize::new(0));
    let r = redirected.clone();
    let session = h.service.attach_session(
        subject(),
        SyncOptions::standard(h.service.params()),
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
    );
    session.mount().await.unwrap();
    assert!(session.is_polling());

    h.backend.set_profile(fully_verified_profile());
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(h.service.status(&subject()).stage(), VerificationStage::FullyVerified);
    assert!(!session.is_polling());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(redirected.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn poll_errors_do_not_stop_polling() {
    let h = harness();
    let session = h.service.attach_session(
        subject(),
        SyncOptions::standard(h.service.params()),
        || {},
    );
    session.mount().await.unwrap();
    h.backend
        .fail_next_status(VerificationError::Network("timeout".into()));
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(session.is_polling());
    assert_eq!(h.backend.status_fetches(), 3);
}

// ── Remembered device ──────────────────────────────────────────────────

#[tokio::test]
async fn only_fully_verified_subjects_remember_a_device() {
    let h = harness();
    assert!(matches!(
        h.service.remember_device(&subject(), "bio-token").await,
        Err(VerificationError::PreconditionNotMet { .. })
    ));

    h.backend.set_profile(fully_verified_profile());
    h.service.refresh_status(&subject()).await.unwrap();
    h.service.remember_device(&subject(), "bio-token").await.unwrap();
    assert_eq!(
        h.service.recall_device(&subject()).await.unwrap().as_deref(),
        Some("bio-token")
    );
    assert_eq!(h.credentials.keys(), vec!["ekyc.device.subject-42".to_string()]);

    assert!(h.service.forget_device(&subject()).await.unwrap());
    assert!(!h.service.forget_device(&subject()).await.unwrap());
    assert_eq!(h.service.recall_device(&subject()).await.unwrap(), None);
}
