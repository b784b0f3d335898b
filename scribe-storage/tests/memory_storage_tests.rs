//! MemoryStorage contract behavior: snapshots, the operation log and paging.

use pretty_assertions::assert_eq;
use scribe_storage::{
    DocumentStorage, MemoryStorage, OperationFilter, OperationStorage, StorageError,
};
use scribe_types::{
    AbortHandle, ActionKind, Document, DocumentHeader, DocumentId, Operation, OperationContext,
    OperationId, PageCursor, Timestamp, collect_all_pages,
};
use serde_json::json;

fn document(document_type: &str) -> Document {
    Document::new(DocumentHeader::new(DocumentId::new(), document_type, "main"))
}

fn operation(doc: &Document, scope: &str, index: u64) -> Operation {
    Operation {
        id: OperationId::new(),
        index,
        skip: 0,
        kind: ActionKind::Custom("SET_VALUE".to_string()),
        input: json!({ "index": index }),
        hash: format!("hash-{index}"),
        timestamp: Timestamp::now(),
        error: None,
        context: Some(OperationContext {
            document_id: doc.header.id,
            document_type: doc.header.document_type.clone(),
            scope: scope.to_string(),
            branch: doc.header.branch.clone(),
            signer: None,
            resulting_state: None,
        }),
    }
}

fn contextless_operation(index: u64) -> Operation {
    Operation {
        id: OperationId::new(),
        index,
        skip: 0,
        kind: ActionKind::Custom("SET_VALUE".to_string()),
        input: json!({}),
        hash: format!("hash-{index}"),
        timestamp: Timestamp::now(),
        error: None,
        context: None,
    }
}

// ── Document snapshots ───────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_roundtrips() {
    let storage = MemoryStorage::new();
    let doc = document("notes/todo");
    let id = doc.header.id;

    storage.create(doc.clone()).await.unwrap();
    assert_eq!(storage.get(id).await.unwrap(), doc);
    assert_eq!(storage.document_count(), 1);
}

#[tokio::test]
async fn get_missing_document_fails() {
    let storage = MemoryStorage::new();
    let id = DocumentId::new();

    let err = storage.get(id).await.unwrap_err();
    assert!(matches!(err, StorageError::DocumentNotFound(missing) if missing == id));
}

#[tokio::test]
async fn exists_reflects_creation() {
    let storage = MemoryStorage::new();
    let doc = document("notes/todo");
    let id = doc.header.id;

    assert!(!storage.exists(id).await.unwrap());
    storage.create(doc).await.unwrap();
    assert!(storage.exists(id).await.unwrap());
}

#[tokio::test]
async fn duplicate_create_rejected() {
    let storage = MemoryStorage::new();
    let doc = document("notes/todo");

    storage.create(doc.clone()).await.unwrap();
    let err = storage.create(doc).await.unwrap_err();
    assert!(matches!(err, StorageError::DocumentAlreadyExists(_)));
}

// ── Operation log ────────────────────────────────────────────────────────

#[tokio::test]
async fn add_operations_appends_log_and_replaces_snapshot() {
    let storage = MemoryStorage::new();
    let doc = document("notes/todo");
    let id = doc.header.id;
    storage.create(doc.clone()).await.unwrap();

    let mut updated = doc.clone();
    let op = operation(&doc, "global", 0);
    updated.state.global = json!({"title": "groceries"});
    updated.append_operation("global", op.clone());

    storage.add_operations(id, vec![op], &updated).await.unwrap();

    assert_eq!(storage.get(id).await.unwrap(), updated);
    assert_eq!(storage.operation_count(), 1);
}

#[tokio::test]
async fn add_operations_upserts_unknown_documents() {
    // Replicated documents arrive through the log without a create() call.
    let storage = MemoryStorage::new();
    let mut doc = document("notes/todo");
    let id = doc.header.id;
    let op = operation(&doc, "global", 0);
    doc.append_operation("global", op.clone());

    storage.add_operations(id, vec![op], &doc).await.unwrap();

    assert!(storage.exists(id).await.unwrap());
    assert_eq!(storage.get(id).await.unwrap(), doc);
}

// ── find: filtering ──────────────────────────────────────────────────────

#[tokio::test]
async fn empty_filter_matches_everything() {
    let storage = MemoryStorage::new();
    let doc_a = document("notes/todo");
    let doc_b = document("notes/journal");

    storage
        .add_operations(doc_a.header.id, vec![operation(&doc_a, "global", 0)], &doc_a)
        .await
        .unwrap();
    storage
        .add_operations(doc_b.header.id, vec![operation(&doc_b, "local", 0)], &doc_b)
        .await
        .unwrap();

    let page = storage.find(&OperationFilter::new(), None).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn filter_narrows_by_document_scope_and_branch() {
    let storage = MemoryStorage::new();
    let doc_a = document("notes/todo");
    let doc_b = document("notes/todo");

    storage
        .add_operations(
            doc_a.header.id,
            vec![operation(&doc_a, "global", 0), operation(&doc_a, "local", 0)],
            &doc_a,
        )
        .await
        .unwrap();
    storage
        .add_operations(doc_b.header.id, vec![operation(&doc_b, "global", 0)], &doc_b)
        .await
        .unwrap();

    let filter = OperationFilter::for_document(doc_a.header.id).in_scope("global");
    let page = storage.find(&filter, None).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].document_id(), Some(doc_a.header.id));
    assert_eq!(page.items[0].scope(), Some("global"));

    let other_branch = OperationFilter::for_document(doc_a.header.id).on_branch("draft");
    let page = storage.find(&other_branch, None).await.unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn filter_from_index_is_inclusive() {
    let storage = MemoryStorage::new();
    let doc = document("notes/todo");
    let ops: Vec<Operation> = (0..4).map(|i| operation(&doc, "global", i)).collect();
    storage.add_operations(doc.header.id, ops, &doc).await.unwrap();

    let filter = OperationFilter::for_document(doc.header.id).from_index(2);
    let page = storage.find(&filter, None).await.unwrap();
    let indices: Vec<u64> = page.items.iter().map(|op| op.index).collect();
    assert_eq!(indices, vec![2, 3]);
}

#[tokio::test]
async fn contextless_operations_only_match_unscoped_filters() {
    let storage = MemoryStorage::new();
    let doc = document("notes/todo");
    storage
        .add_operations(doc.header.id, vec![contextless_operation(0)], &doc)
        .await
        .unwrap();

    let everything = storage.find(&OperationFilter::new(), None).await.unwrap();
    assert_eq!(everything.items.len(), 1);

    let scoped = OperationFilter::for_document(doc.header.id);
    let page = storage.find(&scoped, None).await.unwrap();
    assert!(page.items.is_empty());
}

// ── find: paging ─────────────────────────────────────────────────────────

#[tokio::test]
async fn find_pages_in_commit_order() {
    let storage = MemoryStorage::with_page_size(2);
    let doc = document("notes/todo");
    let ops: Vec<Operation> = (0..5).map(|i| operation(&doc, "global", i)).collect();
    storage.add_operations(doc.header.id, ops, &doc).await.unwrap();

    let filter = OperationFilter::new();
    let first = storage.find(&filter, None).await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].index, 0);
    let second = storage.find(&filter, first.next_cursor).await.unwrap();
    assert_eq!(second.items.len(), 2);
    assert_eq!(second.items[0].index, 2);
    let third = storage.find(&filter, second.next_cursor).await.unwrap();
    assert_eq!(third.items.len(), 1);
    assert_eq!(third.items[0].index, 4);
    assert!(third.next_cursor.is_none());
}

#[tokio::test]
async fn invalid_cursor_fails() {
    let storage = MemoryStorage::new();
    let err = storage
        .find(&OperationFilter::new(), Some(PageCursor::new("not-a-number")))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidCursor(_)));
}

#[tokio::test]
async fn collect_all_pages_drains_find() {
    let storage = MemoryStorage::with_page_size(3);
    let doc = document("notes/todo");
    let ops: Vec<Operation> = (0..10).map(|i| operation(&doc, "global", i)).collect();
    storage.add_operations(doc.header.id, ops, &doc).await.unwrap();

    let filter = OperationFilter::for_document(doc.header.id);
    let abort = AbortHandle::new();
    let all = collect_all_pages(
        |cursor| {
            let filter = filter.clone();
            let storage = &storage;
            async move { storage.find(&filter, cursor).await }
        },
        &abort,
    )
    .await
    .unwrap();

    let indices: Vec<u64> = all.iter().map(|op| op.index).collect();
    assert_eq!(indices, (0..10).collect::<Vec<u64>>());
}
