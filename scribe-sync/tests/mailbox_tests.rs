//! Mailbox semantics: ordered transfers, batched callbacks, in-place
//! replacement.

use pretty_assertions::assert_eq;
use scribe_sync::{Mailbox, SyncOperation};
use scribe_types::DocumentId;
use std::sync::{Arc, Mutex};

fn transfer(remote_name: &str) -> Arc<SyncOperation> {
    Arc::new(SyncOperation::new(
        remote_name,
        DocumentId::new(),
        vec!["global".to_string()],
        "main",
        Vec::new(),
    ))
}

type BatchListener = Box<dyn Fn(&[Arc<SyncOperation>]) + Send + Sync>;

/// Collects the remote names of each callback batch.
fn record_batches(register: impl FnOnce(BatchListener)) -> Arc<Mutex<Vec<Vec<String>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    register(Box::new(move |batch| {
        let names = batch.iter().map(|op| op.remote_name.clone()).collect();
        log.lock().unwrap().push(names);
    }));
    seen
}

// ── Ordering and replacement ──────────────────────────────────────

#[test]
fn transfers_keep_insertion_order() {
    let mailbox = Mailbox::new();
    mailbox.add(transfer("alpha"));
    mailbox.add(transfer("beta"));
    mailbox.add(transfer("gamma"));

    let names: Vec<String> = mailbox
        .items()
        .iter()
        .map(|op| op.remote_name.clone())
        .collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    assert_eq!(mailbox.len(), 3);
}

#[test]
fn re_adding_an_id_replaces_in_place() {
    let mailbox = Mailbox::new();
    let original = transfer("beta");
    mailbox.add(transfer("alpha"));
    mailbox.add(Arc::clone(&original));
    mailbox.add(transfer("gamma"));

    let mut replacement = SyncOperation::new(
        "beta-revised",
        original.document_id,
        vec!["global".to_string()],
        "main",
        Vec::new(),
    );
    replacement.id = original.id;
    mailbox.add(Arc::new(replacement));

    let names: Vec<String> = mailbox
        .items()
        .iter()
        .map(|op| op.remote_name.clone())
        .collect();
    assert_eq!(names, vec!["alpha", "beta-revised", "gamma"]);
    assert_eq!(mailbox.len(), 3);
}

#[test]
fn get_finds_a_transfer_by_id() {
    let mailbox = Mailbox::new();
    let wanted = transfer("beta");
    mailbox.add(transfer("alpha"));
    mailbox.add(Arc::clone(&wanted));

    assert_eq!(mailbox.get(wanted.id).map(|op| op.id), Some(wanted.id));
    assert!(mailbox.get(transfer("other").id).is_none());
}

// ── Added callbacks ───────────────────────────────────────────────

#[test]
fn a_batch_fires_one_added_callback() {
    let mailbox = Mailbox::new();
    let seen = record_batches(|listener| mailbox.on_added(listener));

    mailbox.add_many(vec![transfer("alpha"), transfer("beta"), transfer("gamma")]);

    assert_eq!(*seen.lock().unwrap(), vec![vec!["alpha", "beta", "gamma"]]);
}

#[test]
fn adding_one_is_a_batch_of_one() {
    let mailbox = Mailbox::new();
    let seen = record_batches(|listener| mailbox.on_added(listener));

    mailbox.add(transfer("alpha"));
    mailbox.add(transfer("beta"));

    assert_eq!(*seen.lock().unwrap(), vec![vec!["alpha"], vec!["beta"]]);
}

#[test]
fn an_empty_batch_fires_nothing() {
    let mailbox = Mailbox::new();
    let seen = record_batches(|listener| mailbox.on_added(listener));

    mailbox.add_many(Vec::new());

    assert!(seen.lock().unwrap().is_empty());
    assert!(mailbox.is_empty());
}

#[test]
fn a_listener_added_during_a_callback_hears_the_next_batch() {
    let mailbox = Arc::new(Mailbox::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let inner_mailbox = Arc::clone(&mailbox);
    let log = Arc::clone(&seen);
    mailbox.on_added(move |_batch| {
        let log = Arc::clone(&log);
        inner_mailbox.on_added(move |batch| {
            log.lock().unwrap().push(batch.len());
        });
    });

    mailbox.add(transfer("alpha"));
    mailbox.add_many(vec![transfer("beta"), transfer("gamma")]);

    // The listener registered while "alpha" landed first hears the
    // two-transfer batch.
    assert_eq!(seen.lock().unwrap().first(), Some(&2));
}

// ── Removal ───────────────────────────────────────────────────────

#[test]
fn remove_returns_the_transfer() {
    let mailbox = Mailbox::new();
    let wanted = transfer("beta");
    mailbox.add(transfer("alpha"));
    mailbox.add(Arc::clone(&wanted));
    let seen = record_batches(|listener| mailbox.on_removed(listener));

    let removed = mailbox.remove(wanted.id);

    assert_eq!(removed.map(|op| op.id), Some(wanted.id));
    assert_eq!(mailbox.len(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![vec!["beta"]]);
}

#[test]
fn removing_an_absent_id_fires_nothing() {
    let mailbox = Mailbox::new();
    mailbox.add(transfer("alpha"));
    let seen = record_batches(|listener| mailbox.on_removed(listener));

    let removed = mailbox.remove(transfer("other").id);

    assert!(removed.is_none());
    assert_eq!(mailbox.len(), 1);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn remove_many_reports_only_what_was_present() {
    let mailbox = Mailbox::new();
    let first = transfer("alpha");
    let second = transfer("beta");
    mailbox.add(Arc::clone(&first));
    mailbox.add(Arc::clone(&second));
    mailbox.add(transfer("gamma"));
    let seen = record_batches(|listener| mailbox.on_removed(listener));

    let removed = mailbox.remove_many(&[first.id, transfer("other").id, second.id]);

    assert_eq!(removed.len(), 2);
    assert_eq!(mailbox.len(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![vec!["alpha", "beta"]]);
}
