//! QueueManager dispatch: validation, ordering, retries, dependencies and
//! lifecycle events.

use scribe_bus::EventBus;
use scribe_queue::delegate::mock::MockDelegate;
use scribe_queue::{
    ErrorSink, JobAdded, JobCompleted, JobFailed, JobStarted, QueueConfig, QueueError,
    QueueManager, QueueRemoved, ServerDelegate,
};
use scribe_types::{
    Action, ActionKind, Document, DocumentHeader, DocumentId, Job, JobPayload, JobResult,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn actions_job(document_id: DocumentId, scope: &str, n: u64) -> Job {
    Job::from_actions(
        document_id,
        scope,
        "main",
        vec![Action::new(
            ActionKind::Custom("SET_VALUE".to_string()),
            scope,
            json!({ "n": n }),
        )],
    )
}

fn job_n(job: &Job) -> u64 {
    match &job.payload {
        JobPayload::Actions(actions) => actions[0].input["n"].as_u64().unwrap(),
        _ => panic!("not an actions job"),
    }
}

fn noop_sink() -> ErrorSink {
    Arc::new(|_: anyhow::Error| {})
}

fn fast_retry_config(max_workers: usize) -> QueueConfig {
    QueueConfig {
        max_workers,
        retry_base_delay: Duration::from_millis(5),
        retry_max_delay: Duration::from_millis(20),
    }
}

fn manager_with(config: QueueConfig, delegate: &Arc<MockDelegate>) -> (QueueManager, EventBus) {
    let bus = EventBus::new();
    let manager = QueueManager::new(config, bus.clone());
    manager.init(Arc::clone(delegate) as Arc<dyn ServerDelegate>, noop_sink());
    (manager, bus)
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

// ── Validation ────────────────────────────────────────────────────

#[tokio::test]
async fn add_job_without_delegate_is_rejected() {
    let manager = QueueManager::new(QueueConfig::default(), EventBus::new());
    let err = manager
        .add_job(actions_job(DocumentId::new(), "global", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::NoDelegate));
}

#[tokio::test]
async fn empty_actions_job_is_rejected() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(QueueConfig::default(), &delegate);

    let job = Job::from_actions(DocumentId::new(), "global", "main", Vec::new());
    let err = manager.add_job(job).await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
}

#[tokio::test]
async fn mixed_scope_actions_are_rejected() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(QueueConfig::default(), &delegate);

    let job = Job::from_actions(
        DocumentId::new(),
        "global",
        "main",
        vec![
            Action::new(ActionKind::Custom("A".to_string()), "global", json!({})),
            Action::new(ActionKind::Custom("B".to_string()), "local", json!({})),
        ],
    );
    let err = manager.add_job(job).await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
}

#[tokio::test]
async fn deleted_queue_rejects_jobs() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(QueueConfig::default(), &delegate);
    let id = DocumentId::new();

    manager.set_queue_deleted(id, "global", true);
    let err = manager.add_job(actions_job(id, "global", 0)).await.unwrap_err();
    assert!(matches!(err, QueueError::QueueDeleted { .. }));
}

#[tokio::test]
async fn add_job_assigns_fresh_ids() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(QueueConfig::default(), &delegate);

    let job = actions_job(DocumentId::new(), "global", 0);
    let original = job.id;
    let first = manager.add_job(job.clone()).await.unwrap();
    let second = manager.add_job(job).await.unwrap();

    assert_ne!(first, second);
    assert_ne!(first, original);
}

// ── Ordering & concurrency ────────────────────────────────────────

#[tokio::test]
async fn same_document_jobs_run_in_submission_order() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(fast_retry_config(10), &delegate);
    let id = DocumentId::new();

    for n in 0..20 {
        manager.add_job(actions_job(id, "global", n)).await.unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(5), || delegate.processed().len() == 20).await,
        "all jobs should complete"
    );
    let order: Vec<u64> = delegate.processed().iter().map(job_n).collect();
    assert_eq!(order, (0..20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn different_documents_run_concurrently() {
    let delegate = Arc::new(MockDelegate::new().with_delay(Duration::from_millis(50)));
    let (manager, _bus) = manager_with(fast_retry_config(4), &delegate);

    for _ in 0..4 {
        manager
            .add_job(actions_job(DocumentId::new(), "global", 0))
            .await
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 4).await);
    assert!(
        delegate.max_in_flight() >= 2,
        "expected overlapping execution, saw {}",
        delegate.max_in_flight()
    );
}

#[tokio::test]
async fn single_worker_never_overlaps() {
    let delegate = Arc::new(MockDelegate::new().with_delay(Duration::from_millis(10)));
    let (manager, _bus) = manager_with(fast_retry_config(1), &delegate);

    for n in 0..3 {
        manager
            .add_job(actions_job(DocumentId::new(), "global", n))
            .await
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 3).await);
    assert_eq!(delegate.max_in_flight(), 1);
    let order: Vec<u64> = delegate.processed().iter().map(job_n).collect();
    assert_eq!(order, vec![0, 1, 2]);
}

#[tokio::test]
async fn per_document_order_survives_concurrency() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(fast_retry_config(10), &delegate);
    let docs: Vec<DocumentId> = (0..5).map(|_| DocumentId::new()).collect();

    for n in 0..20 {
        for doc in &docs {
            manager.add_job(actions_job(*doc, "global", n)).await.unwrap();
        }
    }

    assert!(
        wait_until(Duration::from_secs(10), || delegate.processed().len() == 100).await,
        "all jobs should complete"
    );
    for doc in &docs {
        let order: Vec<u64> = delegate
            .processed()
            .iter()
            .filter(|job| job.document_id == *doc)
            .map(job_n)
            .collect();
        assert_eq!(order, (0..20).collect::<Vec<u64>>(), "order broken for {doc}");
    }
}

// ── Retries ───────────────────────────────────────────────────────

#[tokio::test]
async fn failed_job_retries_until_success() {
    let delegate = Arc::new(MockDelegate::new().failing_attempts(2));
    let bus = EventBus::new();
    let manager = QueueManager::new(fast_retry_config(2), bus.clone());
    manager.init(Arc::clone(&delegate) as Arc<dyn ServerDelegate>, noop_sink());

    let completed: Arc<Mutex<Vec<JobResult>>> = Arc::new(Mutex::new(Vec::new()));
    let completed_inner = Arc::clone(&completed);
    let _sub = bus.subscribe::<JobCompleted, _, _>(move |event| {
        let completed = Arc::clone(&completed_inner);
        async move {
            completed.lock().unwrap().push(event.result);
            Ok(())
        }
    });

    let job = actions_job(DocumentId::new(), "global", 0).with_max_retries(3);
    manager.add_job(job).await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 1).await);
    assert!(wait_until(Duration::from_secs(1), || !completed.lock().unwrap().is_empty()).await);

    let result = completed.lock().unwrap().remove(0);
    assert!(result.success);
    assert_eq!(result.job.retry_count, 2);
    assert_eq!(result.job.error_history.len(), 2);
}

#[tokio::test]
async fn exhausted_retries_fail_permanently() {
    let delegate = Arc::new(MockDelegate::new().failing_attempts(10));
    let bus = EventBus::new();
    let manager = QueueManager::new(fast_retry_config(2), bus.clone());

    let sink_calls = Arc::new(AtomicUsize::new(0));
    let sink_inner = Arc::clone(&sink_calls);
    manager.init(
        Arc::clone(&delegate) as Arc<dyn ServerDelegate>,
        Arc::new(move |_: anyhow::Error| {
            sink_inner.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let failed: Arc<Mutex<Vec<Job>>> = Arc::new(Mutex::new(Vec::new()));
    let failed_inner = Arc::clone(&failed);
    let _sub = bus.subscribe::<JobFailed, _, _>(move |event| {
        let failed = Arc::clone(&failed_inner);
        async move {
            failed.lock().unwrap().push(event.job);
            Ok(())
        }
    });

    let job = actions_job(DocumentId::new(), "global", 0).with_max_retries(2);
    manager.add_job(job).await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || !failed.lock().unwrap().is_empty()).await);
    let job = failed.lock().unwrap().remove(0);
    // initial attempt plus two retries
    assert_eq!(job.error_history.len(), 3);
    assert_eq!(job.retry_count, 2);
    assert_eq!(sink_calls.load(Ordering::SeqCst), 1);
    assert!(delegate.processed().is_empty());

    let stats = manager.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 0);
}

#[tokio::test]
async fn hard_error_fails_without_retry() {
    let delegate = Arc::new(MockDelegate::new().with_hard_error());
    let bus = EventBus::new();
    let manager = QueueManager::new(fast_retry_config(2), bus.clone());
    manager.init(Arc::clone(&delegate) as Arc<dyn ServerDelegate>, noop_sink());

    let failed: Arc<Mutex<Vec<Job>>> = Arc::new(Mutex::new(Vec::new()));
    let failed_inner = Arc::clone(&failed);
    let _sub = bus.subscribe::<JobFailed, _, _>(move |event| {
        let failed = Arc::clone(&failed_inner);
        async move {
            failed.lock().unwrap().push(event.job);
            Ok(())
        }
    });

    let job = actions_job(DocumentId::new(), "global", 0).with_max_retries(3);
    manager.add_job(job).await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || !failed.lock().unwrap().is_empty()).await);
    let job = failed.lock().unwrap().remove(0);
    assert_eq!(job.error_history.len(), 1, "no retries on a hard error");
    assert_eq!(job.retry_count, 0);
}

// ── Dependencies ──────────────────────────────────────────────────

#[tokio::test]
async fn queue_hint_gates_across_documents() {
    let delegate = Arc::new(MockDelegate::new().with_delay(Duration::from_millis(30)));
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);

    let doc_a = DocumentId::new();
    let doc_b = DocumentId::new();
    let first = manager.add_job(actions_job(doc_a, "global", 1)).await.unwrap();
    manager
        .add_job(actions_job(doc_b, "global", 2).with_queue_hint(vec![first]))
        .await
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 2).await);
    let order: Vec<u64> = delegate.processed().iter().map(job_n).collect();
    assert_eq!(order, vec![1, 2]);
    assert_eq!(delegate.max_in_flight(), 1, "dependent never overlaps its prerequisite");
}

#[tokio::test]
async fn failed_prerequisite_still_unblocks_dependents() {
    let delegate = Arc::new(MockDelegate::new().failing_attempts(1));
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);

    let doc_a = DocumentId::new();
    let doc_b = DocumentId::new();
    let doomed = manager
        .add_job(actions_job(doc_a, "global", 1).with_max_retries(0))
        .await
        .unwrap();
    manager
        .add_job(actions_job(doc_b, "global", 2).with_queue_hint(vec![doomed]))
        .await
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 1).await);
    assert_eq!(job_n(&delegate.processed()[0]), 2);

    let stats = manager.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test]
async fn hint_on_finished_job_does_not_gate() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);

    let first = manager
        .add_job(actions_job(DocumentId::new(), "global", 1))
        .await
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 1).await);

    manager
        .add_job(actions_job(DocumentId::new(), "global", 2).with_queue_hint(vec![first]))
        .await
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 2).await);
}

#[tokio::test]
async fn missing_document_waits_for_pending_creation_job() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);

    let doc_id = DocumentId::new();
    delegate.mark_missing(doc_id);

    // Hold the creation job back so the actions job would otherwise
    // dispatch first.
    manager.set_queue_blocked(doc_id, "global", true);
    let document = Document::new(DocumentHeader::new(doc_id, "scribe/drive", "main"));
    manager.add_job(Job::create_document(&document)).await.unwrap();

    manager.add_job(actions_job(doc_id, "local", 7)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(delegate.processed().is_empty(), "everything still gated");

    manager.set_queue_blocked(doc_id, "global", false);
    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 2).await);

    let kinds: Vec<bool> = delegate
        .processed()
        .iter()
        .map(|job| matches!(job.payload, JobPayload::CreateDocument { .. }))
        .collect();
    assert_eq!(kinds, vec![true, false], "creation ran first");
}

// ── Pause / resume / stop ─────────────────────────────────────────

#[tokio::test]
async fn pause_buffers_and_resume_drains() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);
    let id = DocumentId::new();

    manager.pause();
    manager.add_job(actions_job(id, "global", 0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(delegate.processed().is_empty());
    assert_eq!(manager.queue_size(id, "global"), 1);

    manager.resume();
    assert!(wait_until(Duration::from_secs(5), || delegate.processed().len() == 1).await);
    assert_eq!(manager.queue_size(id, "global"), 0);
}

#[tokio::test]
async fn graceful_stop_waits_for_running_jobs() {
    let delegate = Arc::new(MockDelegate::new().with_delay(Duration::from_millis(50)));
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);

    manager
        .add_job(actions_job(DocumentId::new(), "global", 0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    manager.stop(true).await;
    assert_eq!(delegate.processed().len(), 1);
}

#[tokio::test]
async fn stop_prevents_further_dispatch() {
    let delegate = Arc::new(MockDelegate::new().with_delay(Duration::from_millis(30)));
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);
    let id = DocumentId::new();

    for n in 0..3 {
        manager.add_job(actions_job(id, "global", n)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    manager.stop(true).await;
    assert_eq!(delegate.processed().len(), 1);
    assert_eq!(manager.queue_size(id, "global"), 2);
}

// ── Queue removal & events ────────────────────────────────────────

#[tokio::test]
async fn remove_queue_drops_pending_work_and_emits() {
    let delegate = Arc::new(MockDelegate::new());
    let bus = EventBus::new();
    let manager = QueueManager::new(fast_retry_config(2), bus.clone());
    manager.init(Arc::clone(&delegate) as Arc<dyn ServerDelegate>, noop_sink());
    let id = DocumentId::new();

    let removed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let removed_inner = Arc::clone(&removed);
    let _sub = bus.subscribe::<QueueRemoved, _, _>(move |event| {
        let removed = Arc::clone(&removed_inner);
        async move {
            removed.lock().unwrap().push(event.scope);
            Ok(())
        }
    });

    manager.pause();
    manager.add_job(actions_job(id, "global", 0)).await.unwrap();

    assert!(manager.remove_queue(id, "global").await);
    assert!(!manager.remove_queue(id, "global").await);
    assert_eq!(*removed.lock().unwrap(), vec!["global".to_string()]);

    manager.resume();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(delegate.processed().is_empty(), "removed work never runs");
}

#[tokio::test]
async fn remove_document_queues_covers_every_scope() {
    let delegate = Arc::new(MockDelegate::new());
    let (manager, _bus) = manager_with(fast_retry_config(2), &delegate);
    let id = DocumentId::new();

    manager.pause();
    manager.add_job(actions_job(id, "global", 0)).await.unwrap();
    manager.add_job(actions_job(id, "local", 1)).await.unwrap();

    manager.remove_document_queues(id).await;
    assert_eq!(manager.queue_size(id, "global"), 0);
    assert_eq!(manager.queue_size(id, "local"), 0);
}

#[tokio::test]
async fn lifecycle_events_fire_in_order() {
    let delegate = Arc::new(MockDelegate::new());
    let bus = EventBus::new();
    let manager = QueueManager::new(fast_retry_config(2), bus.clone());
    manager.init(Arc::clone(&delegate) as Arc<dyn ServerDelegate>, noop_sink());

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let log_added = Arc::clone(&log);
    let _added = bus.subscribe::<JobAdded, _, _>(move |_| {
        let log = Arc::clone(&log_added);
        async move {
            log.lock().unwrap().push("added");
            Ok(())
        }
    });
    let log_started = Arc::clone(&log);
    let _started = bus.subscribe::<JobStarted, _, _>(move |_| {
        let log = Arc::clone(&log_started);
        async move {
            log.lock().unwrap().push("started");
            Ok(())
        }
    });
    let log_completed = Arc::clone(&log);
    let _completed = bus.subscribe::<JobCompleted, _, _>(move |_| {
        let log = Arc::clone(&log_completed);
        async move {
            log.lock().unwrap().push("completed");
            Ok(())
        }
    });

    manager
        .add_job(actions_job(DocumentId::new(), "global", 0))
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || log.lock().unwrap().len() == 3).await,
        "expected three lifecycle events"
    );
    assert_eq!(*log.lock().unwrap(), vec!["added", "started", "completed"]);
}

// ── Stats ─────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_track_outcomes_and_backlog() {
    let delegate = Arc::new(MockDelegate::new().failing_attempts(1));
    let (manager, _bus) = manager_with(fast_retry_config(1), &delegate);

    // first job burns the injected failure with no retry budget
    manager
        .add_job(actions_job(DocumentId::new(), "global", 0).with_max_retries(0))
        .await
        .unwrap();
    manager
        .add_job(actions_job(DocumentId::new(), "global", 1))
        .await
        .unwrap();
    manager
        .add_job(actions_job(DocumentId::new(), "global", 2))
        .await
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.stats().processed == 3
    })
    .await);

    let stats = manager.stats();
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.backlog, 0);
}
