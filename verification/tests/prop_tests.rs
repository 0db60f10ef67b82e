use proptest::prelude::*;

use ekyc_nullables::NullBackend;
use ekyc_types::{
    DocumentFields, DocumentSnapshot, FieldName, PhoneNumber, SubjectId, Timestamp,
    VerificationStage,
};
use ekyc_verification::{
    ChallengePolicy, ChallengeStatus, ConfirmationReconciler, StageEvent, SubjectQueue,
    SubmitMode, SubmitOutcome, SystemClock, VerificationChallenge, VerificationError,
    VerificationStateMachine,
};
use std::sync::Arc;

fn subject() -> SubjectId {
    SubjectId::parse("s-prop").unwrap()
}

fn challenge(policy: &ChallengePolicy) -> VerificationChallenge {
    VerificationChallenge::new(subject(), PhoneNumber::parse("+84912345678").unwrap(), policy)
}

fn event(n: u8) -> StageEvent {
    match n % 6 {
        0 => StageEvent::PhoneVerified { challenge_status: ChallengeStatus::Verified },
        1 => StageEvent::PhoneVerified { challenge_status: ChallengeStatus::Sent },
        2 => StageEvent::DocumentCaptured { document_id: "doc".into(), extraction_succeeded: true },
        3 => StageEvent::DocumentCaptured { document_id: "doc".into(), extraction_succeeded: false },
        4 => StageEvent::DocumentConfirmed,
        _ => StageEvent::FaceMatched { score: 0.9, threshold: 0.8 },
    }
}

proptest! {
    /// The send counter never passes the ceiling, whatever the timing.
    #[test]
    fn attempts_never_exceed_ceiling(
        max_attempts in 1u32..8,
        gaps in proptest::collection::vec(0u64..200, 1..40),
    ) {
        let policy = ChallengePolicy { max_attempts, ..ChallengePolicy::default() };
        let mut c = challenge(&policy);
        let mut now = 0u64;
        for gap in gaps {
            now += gap;
            let t = Timestamp::new(now);
            if c.check_send(t).is_ok() {
                c.record_send(c.channel.clone(), t, policy.cooldown_secs, policy.ttl_secs);
            }
            prop_assert!(c.attempt_count <= c.max_attempts);
        }
    }

    /// Early resends carry a strictly positive wait; resends at or after the
    /// cooldown succeed while under the ceiling.
    #[test]
    fn cooldown_is_exact(cooldown in 1u64..600, wait in 0u64..1_200) {
        let policy = ChallengePolicy { cooldown_secs: cooldown, ..ChallengePolicy::default() };
        let mut c = challenge(&policy);
        c.check_send(Timestamp::new(0)).unwrap();
        c.record_send(c.channel.clone(), Timestamp::new(0), cooldown, policy.ttl_secs);

        match c.check_send(Timestamp::new(wait)) {
            Err(VerificationError::CooldownActive { seconds_remaining }) => {
                prop_assert!(wait < cooldown);
                prop_assert!(seconds_remaining > 0);
                prop_assert_eq!(seconds_remaining, cooldown - wait);
            }
            Ok(()) => prop_assert!(wait >= cooldown),
            Err(other) => prop_assert!(false, "unexpected {other:?}"),
        }
    }

    /// Any event sequence moves the stage only along the guard table, one
    /// step at a time, and never reaches the end without a confirmed document.
    #[test]
    fn transitions_follow_the_guard_table(events in proptest::collection::vec(any::<u8>(), 0..30)) {
        let sm = VerificationStateMachine::new(Arc::new(SystemClock));
        let s = subject();
        let mut confirmed_seen = false;
        for n in events {
            let before = sm.stage(&s);
            let e = event(n);
            let result = sm.apply(&s, e.clone());
            let after = sm.stage(&s);

            prop_assert!(after >= before);
            if after != before {
                prop_assert_eq!(before.next(), Some(after));
                prop_assert_eq!(e.requires(), before);
            }
            if before == VerificationStage::DocumentConfirmed || after == VerificationStage::DocumentConfirmed {
                confirmed_seen = true;
            }
            if matches!(e, StageEvent::FaceMatched { .. }) && before < VerificationStage::DocumentConfirmed {
                let precondition_failed = matches!(result, Err(VerificationError::PreconditionNotMet { .. }));
                prop_assert!(precondition_failed);
            }
            if after == VerificationStage::FullyVerified {
                prop_assert!(confirmed_seen);
            }
        }
    }

    /// Submit sends exactly the pending edits, then leaves nothing pending and
    /// the confirmed values equal to the pre-submit merged view.
    #[test]
    fn submit_sends_exactly_the_pending_edits(
        edits in proptest::collection::vec((0usize..4, "[a-z]{1,3}"), 1..12),
    ) {
        let names = ["name", "dob", "address", "id_number"];
        let extracted: DocumentFields = [
            ("name", "ann"),
            ("dob", "1990-01-01"),
            ("address", "hue"),
            ("id_number", "x1"),
        ]
        .iter()
        .map(|(k, v)| (FieldName::parse(*k).unwrap(), v.to_string()))
        .collect();

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let backend = Arc::new(NullBackend::new());
            backend.set_snapshot(DocumentSnapshot { document_id: "doc".into(), fields: extracted.clone() });
            let r = ConfirmationReconciler::new(backend.clone(), Arc::new(SubjectQueue::new()));
            r.load_snapshot(&subject()).await.unwrap();

            for (i, value) in &edits {
                // Dates must stay well-formed to pass validation.
                let value = if names[*i] == "dob" { "2001-02-03".to_string() } else { value.clone() };
                r.record_edit(&subject(), FieldName::parse(names[*i]).unwrap(), &value).unwrap();
            }
            let pending = r.pending_edits(&subject());
            let merged = r.record(&subject()).unwrap().merged_view();

            let result = r.submit(&subject(), SubmitMode::Edits).await;
            if pending.is_empty() {
                prop_assert_eq!(result, Err(VerificationError::NoChanges));
                prop_assert!(backend.patches().is_empty());
            } else {
                prop_assert_eq!(result, Ok(SubmitOutcome::Updated { changed: pending.clone() }));
                prop_assert_eq!(backend.patches(), vec![(subject(), pending)]);
                let record = r.record(&subject()).unwrap();
                prop_assert!(record.pending.is_empty());
                prop_assert_eq!(record.confirmed, merged);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
