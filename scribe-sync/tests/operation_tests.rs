//! Transfer status machines: the forward-only SyncOperation and the
//! mirror-everything JobHandle.

use pretty_assertions::assert_eq;
use scribe_sync::{ChannelError, ChannelErrorKind, JobHandle, SyncOperation, SyncOperationStatus};
use scribe_types::{DocumentId, JobId};
use std::sync::{Arc, Mutex};

fn transfer() -> SyncOperation {
    SyncOperation::new(
        "alpha",
        DocumentId::new(),
        vec!["global".to_string()],
        "main",
        Vec::new(),
    )
}

fn handle() -> JobHandle {
    JobHandle::new(
        "alpha",
        DocumentId::new(),
        vec!["global".to_string()],
        "main",
        Vec::new(),
    )
}

type Seen = Arc<Mutex<Vec<(SyncOperationStatus, SyncOperationStatus)>>>;

fn record_transitions(op: &SyncOperation) -> Seen {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    op.on(move |_op, prev, next| {
        log.lock().unwrap().push((prev, next));
        Ok(())
    });
    seen
}

// ── Transfer lifecycle ────────────────────────────────────────────

#[test]
fn a_new_transfer_is_unknown_with_no_error() {
    let op = transfer();
    assert_eq!(op.status(), SyncOperationStatus::Unknown);
    assert_eq!(op.error(), None);
    assert!(!op.status().is_terminal());
}

#[test]
fn the_happy_path_walks_forward_in_order() {
    let op = transfer();
    let seen = record_transitions(&op);

    op.started().unwrap();
    op.transported().unwrap();
    op.executed().unwrap();

    assert_eq!(op.status(), SyncOperationStatus::Applied);
    assert!(op.status().is_terminal());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (
                SyncOperationStatus::Unknown,
                SyncOperationStatus::TransportPending
            ),
            (
                SyncOperationStatus::TransportPending,
                SyncOperationStatus::ExecutionPending
            ),
            (
                SyncOperationStatus::ExecutionPending,
                SyncOperationStatus::Applied
            ),
        ]
    );
}

#[test]
fn skipping_ahead_is_allowed() {
    let op = transfer();
    let seen = record_transitions(&op);

    op.executed().unwrap();

    assert_eq!(op.status(), SyncOperationStatus::Applied);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(SyncOperationStatus::Unknown, SyncOperationStatus::Applied)]
    );
}

#[test]
fn repeating_a_status_notifies_nobody() {
    let op = transfer();
    let seen = record_transitions(&op);

    op.started().unwrap();
    op.started().unwrap();

    assert_eq!(op.status(), SyncOperationStatus::TransportPending);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn moving_backward_is_a_silent_no_op() {
    let op = transfer();
    let seen = record_transitions(&op);

    op.executed().unwrap();
    op.transported().unwrap();

    assert_eq!(op.status(), SyncOperationStatus::Applied);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn a_failure_after_apply_still_lands() {
    let op = transfer();
    op.executed().unwrap();

    op.failed(ChannelError::outbox("remote rejected the strand"))
        .unwrap();

    assert_eq!(op.status(), SyncOperationStatus::Error);
    let error = op.error().unwrap();
    assert_eq!(error.kind, ChannelErrorKind::Outbox);
    assert_eq!(error.message, "remote rejected the strand");
}

#[test]
fn an_apply_after_failure_is_dropped() {
    let op = transfer();
    op.failed(ChannelError::inbox("load job failed")).unwrap();

    op.executed().unwrap();

    assert_eq!(op.status(), SyncOperationStatus::Error);
    assert_eq!(op.error(), Some(ChannelError::inbox("load job failed")));
}

#[test]
fn the_first_failure_is_kept() {
    let op = transfer();
    op.failed(ChannelError::inbox("first")).unwrap();
    op.failed(ChannelError::outbox("second")).unwrap();

    assert_eq!(op.error(), Some(ChannelError::inbox("first")));
}

#[test]
fn job_dependencies_ride_along() {
    let deps = vec![JobId::new(), JobId::new()];
    let op = SyncOperation::new(
        "alpha",
        DocumentId::new(),
        vec!["global".to_string()],
        "main",
        Vec::new(),
    )
    .with_job_dependencies(deps.clone());

    assert_eq!(op.job_dependencies, deps);
}

// ── Listeners ─────────────────────────────────────────────────────

#[test]
fn listeners_run_in_registration_order() {
    let op = transfer();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        op.on(move |_op, _prev, _next| {
            order.lock().unwrap().push(name);
            Ok(())
        });
    }

    op.started().unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn every_listener_runs_even_when_one_fails() {
    let op = transfer();
    op.on(|_op, _prev, _next| Err(anyhow::anyhow!("first broke")));
    let seen = record_transitions(&op);
    op.on(|_op, _prev, _next| Err(anyhow::anyhow!("third broke")));

    let err = op.started().unwrap_err();

    // The transition itself landed and the healthy listener heard it.
    assert_eq!(op.status(), SyncOperationStatus::TransportPending);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(err.errors.len(), 2);
    assert_eq!(err.errors[0].to_string(), "first broke");
    assert_eq!(err.errors[1].to_string(), "third broke");
    assert_eq!(err.to_string(), "2 status listener(s) failed");
}

#[test]
fn late_listeners_miss_earlier_transitions() {
    let op = transfer();
    op.started().unwrap();

    let seen = record_transitions(&op);
    op.transported().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(
            SyncOperationStatus::TransportPending,
            SyncOperationStatus::ExecutionPending
        )]
    );
}

#[test]
fn a_listener_may_register_another_listener() {
    let op = Arc::new(transfer());
    let nested: Seen = Arc::new(Mutex::new(Vec::new()));

    let outer_op = Arc::clone(&op);
    let log = Arc::clone(&nested);
    op.on(move |_op, _prev, _next| {
        let log = Arc::clone(&log);
        outer_op.on(move |_op, prev, next| {
            log.lock().unwrap().push((prev, next));
            Ok(())
        });
        Ok(())
    });

    op.started().unwrap();
    op.transported().unwrap();

    // The listener registered during `started` hears from `transported` on.
    assert_eq!(
        nested.lock().unwrap().first(),
        Some(&(
            SyncOperationStatus::TransportPending,
            SyncOperationStatus::ExecutionPending
        ))
    );
}

// ── Push handles ──────────────────────────────────────────────────

#[test]
fn a_handle_mirrors_every_report() {
    let handle = handle();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    handle.on(move |_handle, prev, next| {
        log.lock().unwrap().push((prev, next));
        Ok(())
    });

    handle.started().unwrap();
    handle.executed().unwrap();
    handle.started().unwrap();

    assert_eq!(handle.status(), SyncOperationStatus::TransportPending);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (
                SyncOperationStatus::Unknown,
                SyncOperationStatus::TransportPending
            ),
            (
                SyncOperationStatus::TransportPending,
                SyncOperationStatus::Applied
            ),
            (
                SyncOperationStatus::Applied,
                SyncOperationStatus::TransportPending
            ),
        ]
    );
}

#[test]
fn repeated_reports_renotify() {
    let handle = handle();
    let count = Arc::new(Mutex::new(0));
    let calls = Arc::clone(&count);
    handle.on(move |_handle, _prev, _next| {
        *calls.lock().unwrap() += 1;
        Ok(())
    });

    handle.started().unwrap();
    handle.started().unwrap();

    assert_eq!(*count.lock().unwrap(), 2);
}

#[test]
fn a_handle_keeps_the_latest_failure() {
    let handle = handle();
    handle
        .failed(ChannelError::outbox("first rejection"))
        .unwrap();
    handle
        .failed(ChannelError::outbox("second rejection"))
        .unwrap();

    assert_eq!(handle.status(), SyncOperationStatus::Error);
    assert_eq!(
        handle.error(),
        Some(ChannelError::outbox("second rejection"))
    );
}

#[test]
fn a_success_report_leaves_the_error_readable() {
    let handle = handle();
    handle.failed(ChannelError::outbox("flaky wire")).unwrap();

    handle.executed().unwrap();

    assert_eq!(handle.status(), SyncOperationStatus::Applied);
    assert_eq!(handle.error(), Some(ChannelError::outbox("flaky wire")));
}
