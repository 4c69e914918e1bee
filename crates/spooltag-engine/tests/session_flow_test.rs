//! End-to-end session tests against the mock device.
//!
//! These exercise the full detect → write → verify lifecycle with the
//! operator simulated through the mock handle: placing and removing tags,
//! injecting verification failures, and pulling the plug.

use spooltag_core::{EngineConfig, Error, VerificationMode};
use spooltag_engine::{
    MemoryPayloadStore, SessionManager, SessionSnapshot, SessionState, TagPayload, TagPhase,
    audit_channel, content_hash,
};
use spooltag_engine::{AttemptError, TagOutcome};
use std::sync::Arc;
use std::time::Duration;

const SKU: &str = "PLA001";

fn test_config() -> EngineConfig {
    EngineConfig {
        mock_mode: true,
        detection_interval_ms: 5,
        debounce_polls: 2,
        presence_timeout_ms: 2000,
        removal_timeout_ms: 2000,
        inter_attempt_delay_ms: 5,
        ..Default::default()
    }
}

fn patterned_payload() -> TagPayload {
    let bytes: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
    TagPayload::from_bytes(&bytes).unwrap()
}

fn store() -> Arc<MemoryPayloadStore> {
    let mut store = MemoryPayloadStore::new();
    store.insert(SKU.parse().unwrap(), patterned_payload());
    Arc::new(store)
}

fn manager_with(config: EngineConfig) -> SessionManager {
    let manager = SessionManager::new(config, store()).unwrap();
    manager
        .mock_handle()
        .unwrap()
        .set_latency(Duration::ZERO);
    manager
}

/// Wait until the predicate holds for the current snapshot.
async fn wait_for<F>(manager: &SessionManager, predicate: F) -> SessionSnapshot
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let mut rx = manager.watch();
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(snapshot) = rx.borrow_and_update().clone() {
                if predicate(&snapshot) {
                    return snapshot;
                }
            }
            rx.changed().await.expect("status channel closed");
        }
    })
    .await;
    result.expect("timed out waiting for session state")
}

#[tokio::test]
async fn test_happy_path_programs_both_tags() {
    let (audit_tx, mut audit_rx) = audit_channel();
    let manager = manager_with(test_config()).with_audit(audit_tx);
    let handle = manager.mock_handle().unwrap().clone();

    let snapshot = manager.start_session(SKU).await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);

    handle.place_tag();
    wait_for(&manager, |s| s.tag1.phase == TagPhase::Pass).await;

    // The worker confirms removal before awaiting tag 2; give its
    // debounced absence polls time to complete before re-placing.
    handle.remove_tag();
    wait_for(&manager, |s| s.state == SessionState::Tag1DoneAwaitingTag2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    handle.place_tag();
    let last = wait_for(&manager, |s| s.state.is_terminal()).await;

    assert_eq!(last.state, SessionState::Complete);
    assert_eq!(last.tag1.phase, TagPhase::Pass);
    assert_eq!(last.tag2.phase, TagPhase::Pass);
    assert_eq!(last.tag1.attempts_used, 1);
    assert_eq!(last.tag2.attempts_used, 1);

    let expected_hash = content_hash(&patterned_payload());
    assert_eq!(last.tag1.content_hash.as_deref(), Some(expected_hash.as_str()));
    assert_eq!(last.tag2.content_hash.as_deref(), Some(expected_hash.as_str()));

    // One audit record per completed tag.
    let first = audit_rx.recv().await.unwrap();
    assert_eq!(first.tag_number.as_u8(), 1);
    assert_eq!(first.result, TagOutcome::Pass);
    assert_eq!(first.content_hash.as_deref(), Some(expected_hash.as_str()));

    let second = audit_rx.recv().await.unwrap();
    assert_eq!(second.tag_number.as_u8(), 2);
    assert_eq!(second.result, TagOutcome::Pass);
}

#[tokio::test]
async fn test_verification_failure_retries_then_passes() {
    // The PLA001 scenario: strict mode, first attempt fails verification,
    // second succeeds after the operator re-places the tag.
    let manager = manager_with(test_config());
    let handle = manager.mock_handle().unwrap().clone();

    manager.start_session(SKU).await.unwrap();

    handle.corrupt_next_reads(1);
    handle.place_tag();

    let failed = wait_for(&manager, |s| {
        s.tag1.phase == TagPhase::Fail && s.tag1.attempts_used == 1
    })
    .await;
    assert!(matches!(
        failed.tag1.last_error,
        Some(AttemptError::VerificationMismatch { .. })
    ));
    assert_eq!(failed.tag1.attempts_remaining, 2);

    // Operator removes and re-places the tag; the retry re-enters
    // awaiting_tag only after absence is confirmed.
    handle.remove_tag();
    wait_for(&manager, |s| {
        s.tag1.phase == TagPhase::AwaitingTag && s.tag1.attempts_used == 1
    })
    .await;

    handle.place_tag();
    wait_for(&manager, |s| s.tag1.phase == TagPhase::Pass).await;
    assert_eq!(manager.status().unwrap().tag1.attempts_used, 2);

    // Tag 2 proceeds identically. Let the absence polls complete before
    // re-placing.
    handle.remove_tag();
    wait_for(&manager, |s| s.state == SessionState::Tag1DoneAwaitingTag2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    handle.corrupt_next_reads(1);
    handle.place_tag();
    wait_for(&manager, |s| {
        s.tag2.phase == TagPhase::Fail && s.tag2.attempts_used == 1
    })
    .await;

    handle.remove_tag();
    wait_for(&manager, |s| {
        s.tag2.phase == TagPhase::AwaitingTag && s.tag2.attempts_used == 1
    })
    .await;

    handle.place_tag();
    let last = wait_for(&manager, |s| s.state.is_terminal()).await;
    assert_eq!(last.state, SessionState::Complete);
    assert_eq!(last.tag2.attempts_used, 2);
}

#[tokio::test]
async fn test_detection_timeout_exhausts_attempts() {
    let config = EngineConfig {
        presence_timeout_ms: 40,
        ..test_config()
    };
    let manager = manager_with(config);

    // Tag never placed: every attempt times out until the limit.
    manager.start_session(SKU).await.unwrap();
    let last = wait_for(&manager, |s| s.state.is_terminal()).await;

    assert_eq!(last.state, SessionState::Error);
    assert_eq!(last.tag1.phase, TagPhase::Error);
    assert_eq!(last.tag1.attempts_used, 3);
    assert_eq!(last.tag1.attempts_remaining, 0);
    assert!(matches!(
        last.tag1.last_error,
        Some(AttemptError::DetectionTimeout { .. })
    ));

    // Tag 2 never began.
    assert_eq!(last.tag2.phase, TagPhase::Pending);
    assert_eq!(last.tag2.attempts_used, 0);
}

#[tokio::test]
async fn test_tolerant_mode_skips_verification() {
    let config = EngineConfig {
        verification: VerificationMode::Tolerant,
        ..test_config()
    };
    let manager = manager_with(config);
    let handle = manager.mock_handle().unwrap().clone();

    // Corrupted read-backs would fail strict verification, but tolerant
    // mode never reads back.
    handle.corrupt_next_reads(100);

    manager.start_session(SKU).await.unwrap();
    handle.place_tag();
    wait_for(&manager, |s| s.tag1.phase == TagPhase::Pass).await;

    handle.remove_tag();
    wait_for(&manager, |s| s.state == SessionState::Tag1DoneAwaitingTag2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.place_tag();

    let last = wait_for(&manager, |s| s.state.is_terminal()).await;
    assert_eq!(last.state, SessionState::Complete);
    assert!(last.tag1.content_hash.is_none());
    assert!(last.tag2.content_hash.is_none());
}

#[tokio::test]
async fn test_authentication_failure_with_all_keys() {
    let config = EngineConfig {
        retry_limit: 1,
        ..test_config()
    };
    let manager = manager_with(config);
    let handle = manager.mock_handle().unwrap().clone();

    // The simulated tag accepts a key that is not in the configured list.
    handle.set_accepted_keys(vec!["A0A1A2A3A4A5".parse().unwrap()]);

    manager.start_session(SKU).await.unwrap();
    handle.place_tag();

    let last = wait_for(&manager, |s| s.state.is_terminal()).await;
    assert_eq!(last.state, SessionState::Error);
    assert!(matches!(
        last.tag1.last_error,
        Some(AttemptError::AuthenticationFailed)
    ));
}

#[tokio::test]
async fn test_stop_session_is_idempotent() {
    let manager = manager_with(test_config());

    manager.start_session(SKU).await.unwrap();
    wait_for(&manager, |s| s.tag1.phase == TagPhase::AwaitingTag).await;

    manager.stop_session().await;
    let after_first = manager.status().unwrap();
    assert_eq!(after_first.state, SessionState::Stopped);

    manager.stop_session().await;
    let after_second = manager.status().unwrap();
    assert_eq!(after_second.state, SessionState::Stopped);
}

#[tokio::test]
async fn test_start_while_active_is_rejected() {
    let manager = manager_with(test_config());

    let first = manager.start_session(SKU).await.unwrap();
    wait_for(&manager, |s| s.tag1.phase == TagPhase::AwaitingTag).await;

    let result = manager.start_session(SKU).await;
    assert!(matches!(result, Err(Error::SessionAlreadyActive { .. })));

    // The running session is untouched.
    let current = manager.status().unwrap();
    assert_eq!(current.session_id, first.session_id);
    assert!(!current.state.is_terminal());

    manager.stop_session().await;
}

#[tokio::test]
async fn test_unknown_sku_is_rejected_without_state_change() {
    let manager = manager_with(test_config());

    let result = manager.start_session("NOPE99").await;
    assert!(matches!(result, Err(Error::UnknownSku(_))));
    assert!(manager.status().is_none());
    assert!(!manager.is_active());
}

#[tokio::test]
async fn test_device_unavailable_is_session_fatal() {
    let (audit_tx, mut audit_rx) = audit_channel();
    let manager = manager_with(test_config()).with_audit(audit_tx);
    let handle = manager.mock_handle().unwrap().clone();
    handle.set_unavailable(true);

    manager.start_session(SKU).await.unwrap();
    let last = wait_for(&manager, |s| s.state.is_terminal()).await;

    assert_eq!(last.state, SessionState::Error);
    assert!(last.fatal_error.as_deref().unwrap().contains("unavailable"));

    // No tag completed, so no audit record was emitted.
    assert!(audit_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_new_session_allowed_after_terminal() {
    let manager = manager_with(test_config());

    manager.start_session(SKU).await.unwrap();
    wait_for(&manager, |s| s.tag1.phase == TagPhase::AwaitingTag).await;
    manager.stop_session().await;

    let second = manager.start_session(SKU).await.unwrap();
    assert!(!second.state.is_terminal());
    manager.stop_session().await;
}

#[tokio::test]
async fn test_failed_tag_emits_error_audit_record() {
    let (audit_tx, mut audit_rx) = audit_channel();
    let config = EngineConfig {
        presence_timeout_ms: 40,
        retry_limit: 2,
        ..test_config()
    };
    let manager = manager_with(config).with_audit(audit_tx);

    manager.start_session(SKU).await.unwrap();
    wait_for(&manager, |s| s.state.is_terminal()).await;

    let record = audit_rx.recv().await.unwrap();
    assert_eq!(record.result, TagOutcome::Error);
    assert_eq!(record.attempts_used, 2);
    assert!(record.content_hash.is_none());
    assert!(record.error.is_some());
}
