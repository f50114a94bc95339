//! End-to-end controller scenarios against scripted transports.
//!
//! All timing-sensitive tests run with `start_paused = true`, so backoff and
//! timeout sleeps auto-advance deterministically.

use super::*;
use crate::config::SessionConfig;
use crate::mocks::{terminal, transient, ScriptedAttempt, ScriptedTransport};
use crate::types::{Prompt, SessionStatus};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::sync::watch;

fn config(max_attempts: u32) -> SessionConfig {
    SessionConfig::builder()
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(100))
        .build()
}

fn prompt() -> Prompt {
    Prompt::from_user_text("hello")
}

/// Blocks until the published snapshot satisfies the predicate.
async fn wait_for(
    rx: &mut watch::Receiver<crate::types::SessionSnapshot>,
    predicate: impl Fn(&crate::types::SessionSnapshot) -> bool,
) {
    loop {
        let done = {
            let snapshot = rx.borrow_and_update();
            predicate(&*snapshot)
        };
        if done {
            return;
        }
        rx.changed().await.expect("controller dropped");
    }
}

#[tokio::test]
async fn clean_stream_accumulates_and_succeeds() {
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::fragments([
        "He", "llo", ", world",
    ])]);
    let controller = SessionController::new(transport.clone(), config(3));

    let handle = controller.start(prompt()).unwrap();
    let text = handle.join().await.unwrap();

    assert_eq!(text, "Hello, world");
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Succeeded);
    assert_eq!(snapshot.text, "Hello, world");
    assert_eq!(snapshot.attempt, 0);
    assert!(snapshot.error.is_none());
    assert_eq!(transport.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_on_third_attempt() {
    let transport = ScriptedTransport::new(vec![
        ScriptedAttempt::fragments(["Hel"]).then_fail(transient("reset")),
        ScriptedAttempt::failing(transient("reset again")),
        ScriptedAttempt::fragments(["lo"]),
    ]);
    let controller = SessionController::new(transport.clone(), config(3));

    let handle = controller.start(prompt()).unwrap();
    let text = handle.join().await.unwrap();

    // Accumulated text from before the retries is kept; the continuation is
    // appended and the reopen boundaries are observable.
    assert_eq!(text, "Hello");
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Succeeded);
    assert_eq!(snapshot.attempt, 2);
    assert_eq!(controller.reopen_offsets(), vec![1, 1]);
    assert_eq!(transport.opened(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_with_wrapped_error() {
    let transport = ScriptedTransport::new(vec![
        ScriptedAttempt::failing(transient("e1")),
        ScriptedAttempt::failing(transient("e2")),
        ScriptedAttempt::failing(transient("e3")),
        ScriptedAttempt::failing(transient("e4")),
    ]);
    let controller = SessionController::new(transport.clone(), config(3));

    let handle = controller.start(prompt()).unwrap();
    let err = handle.join().await.unwrap_err();

    match err {
        SessionError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, SessionError::Transport { ref message } if message == "e4"));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Failed);
    assert!(snapshot.error.is_some());
    // Initial attempt plus exactly max_attempts reopens, never more.
    assert_eq!(transport.opened(), 4);
}

#[tokio::test(start_paused = true)]
async fn terminal_error_after_retries_keeps_its_variant() {
    let transport = ScriptedTransport::new(vec![
        ScriptedAttempt::failing(transient("reset")),
        ScriptedAttempt::failing(terminal("quota")),
    ]);
    let controller = SessionController::new(transport.clone(), config(3));

    let handle = controller.start(prompt()).unwrap();
    let err = handle.join().await.unwrap_err();

    // A terminal error reached after a retry is not exhaustion; callers can
    // still match on the service variant.
    assert!(matches!(err, SessionError::Service { status_code: Some(403), .. }));
    assert_eq!(controller.snapshot().attempt, 1);
    assert_eq!(transport.opened(), 2);
}

#[tokio::test]
async fn terminal_error_fails_without_retry() {
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::failing(terminal("quota"))]);
    let controller = SessionController::new(transport.clone(), config(3));

    let handle = controller.start(prompt()).unwrap();
    let err = handle.join().await.unwrap_err();

    assert!(matches!(err, SessionError::Service { status_code: Some(403), .. }));
    assert_eq!(controller.snapshot().status, SessionStatus::Failed);
    assert_eq!(transport.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_failure_is_retried_like_a_stream_failure() {
    let transport = ScriptedTransport::new(vec![
        ScriptedAttempt::open_failure(transient("connect refused")),
        ScriptedAttempt::fragments(["ok"]),
    ]);
    let controller = SessionController::new(transport.clone(), config(3));

    let handle = controller.start(prompt()).unwrap();
    assert_eq!(handle.join().await.unwrap(), "ok");
    assert_eq!(controller.snapshot().attempt, 1);
    assert_eq!(transport.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_stream_freezes_accumulated_text() {
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::fragments(["f1", "f2"])
        .then_wait(Duration::from_secs(3600))
        .then_fragment("f3")
        .then_fragment("f4")
        .then_fragment("f5")]);
    let controller = SessionController::new(
        transport,
        SessionConfig::builder()
            .attempt_timeout(Duration::from_secs(100_000))
            .build(),
    );
    let mut rx = controller.subscribe();

    let handle = controller.start(prompt()).unwrap();
    wait_for(&mut rx, |s| s.text == "f1f2").await;

    controller.cancel();
    assert!(matches!(handle.join().await, Err(SessionError::Cancelled)));

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Cancelled);
    assert_eq!(snapshot.text, "f1f2");

    // Even if the remaining fragments become deliverable, nothing changes.
    tokio::time::sleep(Duration::from_secs(4000)).await;
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Cancelled);
    assert_eq!(snapshot.text, "f1f2");
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_prevents_reopen() {
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::failing(transient("reset"))]);
    let controller = SessionController::new(
        transport.clone(),
        SessionConfig::builder()
            .max_attempts(3)
            .base_delay(Duration::from_secs(60))
            .build(),
    );
    let mut rx = controller.subscribe();

    let handle = controller.start(prompt()).unwrap();
    wait_for(&mut rx, |s| s.attempt == 1).await;

    controller.cancel();
    assert!(matches!(handle.join().await, Err(SessionError::Cancelled)));
    assert_eq!(controller.snapshot().status, SessionStatus::Cancelled);
    // The backoff wait was abandoned; no second open happened.
    assert_eq!(transport.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn superseding_start_discards_old_generation() {
    let transport = ScriptedTransport::new(vec![
        ScriptedAttempt::fragments(["old1"])
            .then_wait(Duration::from_secs(600))
            .then_fragment("old2"),
        ScriptedAttempt::fragments(["new"]),
    ]);
    let controller = SessionController::new(
        transport,
        SessionConfig::builder()
            .attempt_timeout(Duration::from_secs(100_000))
            .build(),
    );
    let mut rx = controller.subscribe();

    let first = controller.start(prompt()).unwrap();
    wait_for(&mut rx, |s| s.text == "old1").await;

    let second = controller.start(Prompt::from_user_text("again")).unwrap();
    assert!(second.generation() > first.generation());

    assert!(matches!(first.join().await, Err(SessionError::Cancelled)));
    assert_eq!(second.join().await.unwrap(), "new");

    // The new session's transcript never contains old-generation fragments.
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Succeeded);
    assert_eq!(snapshot.text, "new");

    // Late signals from the abandoned stream change nothing.
    tokio::time::sleep(Duration::from_secs(1000)).await;
    assert_eq!(controller.snapshot().text, "new");
}

#[tokio::test(start_paused = true)]
async fn silent_transport_times_out_as_transient() {
    let transport = ScriptedTransport::new(vec![
        ScriptedAttempt::default().then_wait(Duration::from_secs(10_000))
    ]);
    let controller = SessionController::new(
        transport,
        SessionConfig::builder()
            .retry_policy(crate::retry::RetryPolicy::none())
            .attempt_timeout(Duration::from_secs(5))
            .build(),
    );

    let handle = controller.start(prompt()).unwrap();
    let err = handle.join().await.unwrap_err();

    assert!(matches!(err, SessionError::Timeout { .. }));
    assert_eq!(controller.snapshot().status, SessionStatus::Failed);
}

#[tokio::test]
async fn empty_prompt_is_rejected_synchronously() {
    let transport = ScriptedTransport::new(vec![]);
    let controller = SessionController::new(transport.clone(), config(3));

    let err = controller.start(Prompt::default()).unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput { .. }));

    // No session was created and no request was opened.
    assert_eq!(controller.snapshot().status, SessionStatus::Idle);
    assert_eq!(controller.snapshot().generation, 0);
    assert_eq!(transport.opened(), 0);
}

#[tokio::test]
async fn cancel_after_terminal_state_is_a_noop() {
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::fragments(["done"])]);
    let controller = SessionController::new(transport, config(3));

    let handle = controller.start(prompt()).unwrap();
    handle.join().await.unwrap();

    controller.cancel();
    assert_eq!(controller.snapshot().status, SessionStatus::Succeeded);
    assert_eq!(controller.snapshot().text, "done");
}

#[tokio::test]
async fn cancel_while_idle_is_a_noop() {
    let transport = ScriptedTransport::new(vec![]);
    let controller = SessionController::new(transport, config(3));

    controller.cancel();
    assert_eq!(controller.snapshot().status, SessionStatus::Idle);
}

#[tokio::test]
async fn snapshot_reads_are_idempotent() {
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::fragments(["stable"])]);
    let controller = SessionController::new(transport, config(3));

    let handle = controller.start(prompt()).unwrap();
    handle.join().await.unwrap();

    let first = controller.snapshot();
    let second = controller.snapshot();
    assert_eq!(first.status, second.status);
    assert_eq!(first.text, second.text);
    assert_eq!(first.attempt, second.attempt);
    assert_eq!(first.generation, second.generation);
}

#[tokio::test]
async fn subscribers_see_incremental_snapshots() {
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::fragments(["a", "b"])]);
    let controller = SessionController::new(transport, config(3));
    let mut rx = controller.subscribe();

    let handle = controller.start(prompt()).unwrap();
    wait_for(&mut rx, |s| s.status == SessionStatus::Succeeded).await;

    assert_eq!(rx.borrow().text, "ab");
    handle.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn custom_classifier_overrides_default_retryability() {
    // The transport error would normally be retried; the classifier refuses.
    let transport = ScriptedTransport::new(vec![ScriptedAttempt::failing(transient("reset"))]);
    let controller = SessionController::new(
        transport.clone(),
        SessionConfig::builder()
            .retry_policy(crate::retry::RetryPolicy::default().with_classifier(|_| false))
            .build(),
    );

    let handle = controller.start(prompt()).unwrap();
    let err = handle.join().await.unwrap_err();

    assert!(matches!(err, SessionError::Transport { .. }));
    assert_eq!(transport.opened(), 1);
}
