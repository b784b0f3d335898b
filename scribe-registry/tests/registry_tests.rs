//! Registry registration, lookup and mock reducer behavior.

use pretty_assertions::assert_eq;
use scribe_registry::reducer::mock::MockReducer;
use scribe_registry::{
    DocumentModelModule, DocumentModelRegistry, DocumentModelSpec, Reducer, RegistryError,
};
use scribe_types::{Action, Document, DocumentHeader, DocumentId};
use serde_json::json;
use std::sync::Arc;

fn module(document_type: &str) -> DocumentModelModule {
    DocumentModelModule::new(
        DocumentModelSpec::new(document_type, "Test Model"),
        Arc::new(MockReducer::new()),
    )
}

fn drive_module(document_type: &str) -> DocumentModelModule {
    DocumentModelModule::new(
        DocumentModelSpec::drive(document_type, "Test Drive"),
        Arc::new(MockReducer::new()),
    )
}

fn document(document_type: &str) -> Document {
    Document::new(DocumentHeader::new(DocumentId::new(), document_type, "main"))
}

// ── Registration ────────────────────────────────────────────────────────

#[test]
fn register_then_lookup() {
    let registry = DocumentModelRegistry::new();
    registry.register(module("notes/todo")).unwrap();

    let found = registry.module("notes/todo").unwrap();
    assert_eq!(found.document_type(), "notes/todo");
    assert_eq!(found.spec.name, "Test Model");
    assert_eq!(registry.module_count(), 1);
    assert!(registry.contains("notes/todo"));
}

#[test]
fn duplicate_registration_rejected() {
    let registry = DocumentModelRegistry::new();
    registry.register(module("notes/todo")).unwrap();

    let result = registry.register(drive_module("notes/todo"));
    assert!(matches!(result, Err(RegistryError::DuplicateModule(t)) if t == "notes/todo"));

    // The original registration is untouched.
    assert_eq!(registry.module_count(), 1);
    assert!(!registry.is_drive("notes/todo"));
}

#[test]
fn unregister_removes_module() {
    let registry = DocumentModelRegistry::new();
    registry.register(module("notes/todo")).unwrap();

    registry.unregister("notes/todo").unwrap();
    assert!(!registry.contains("notes/todo"));
    assert_eq!(registry.module_count(), 0);
}

#[test]
fn unregister_unknown_type_fails() {
    let registry = DocumentModelRegistry::new();
    let result = registry.unregister("never/registered");
    assert!(matches!(result, Err(RegistryError::ModuleNotFound(_))));
}

#[test]
fn lookup_unknown_type_fails() {
    let registry = DocumentModelRegistry::new();
    assert!(matches!(
        registry.module("never/registered"),
        Err(RegistryError::ModuleNotFound(_))
    ));
    assert!(matches!(
        registry.reducer("never/registered"),
        Err(RegistryError::ModuleNotFound(_))
    ));
}

#[test]
fn document_types_are_sorted() {
    let registry = DocumentModelRegistry::new();
    registry.register(module("z/last")).unwrap();
    registry.register(module("a/first")).unwrap();
    registry.register(module("m/middle")).unwrap();

    assert_eq!(registry.document_types(), vec!["a/first", "m/middle", "z/last"]);
}

#[test]
fn clear_empties_registry() {
    let registry = DocumentModelRegistry::new();
    registry.register(module("notes/todo")).unwrap();
    registry.register(drive_module("core/drive")).unwrap();

    registry.clear();
    assert_eq!(registry.module_count(), 0);
    assert!(registry.document_types().is_empty());
}

#[test]
fn registry_is_shared_across_threads() {
    let registry = Arc::new(DocumentModelRegistry::new());

    let writer = Arc::clone(&registry);
    std::thread::spawn(move || {
        writer.register(module("notes/todo")).unwrap();
    })
    .join()
    .unwrap();

    assert!(registry.contains("notes/todo"));
}

// ── Drive detection ──────────────────────────────────────────────────────

#[test]
fn drive_flag_comes_from_the_spec() {
    let registry = DocumentModelRegistry::new();
    registry.register(drive_module("core/drive")).unwrap();
    registry.register(module("notes/todo")).unwrap();

    assert!(registry.is_drive("core/drive"));
    assert!(!registry.is_drive("notes/todo"));
}

#[test]
fn unknown_types_are_not_drives() {
    let registry = DocumentModelRegistry::new();
    assert!(!registry.is_drive("never/registered"));
}

// ── Mock reducer ─────────────────────────────────────────────────────────

#[test]
fn mock_reducer_appends_one_operation_per_action() {
    let reducer = MockReducer::new();
    let doc = document("notes/todo");

    let action = Action::custom("SET_TITLE", "global", json!({"title": "groceries"})).unwrap();
    let doc = reducer.apply(&doc, &action).unwrap();

    assert_eq!(doc.operations_for_scope("global").len(), 1);
    assert_eq!(doc.operations_for_scope("global")[0].index, 0);
    assert_eq!(doc.state.global, json!({"title": "groceries"}));
    assert_eq!(doc.header.revision_of("global"), 1);

    let action = Action::custom("SET_TITLE", "global", json!({"title": "chores"})).unwrap();
    let doc = reducer.apply(&doc, &action).unwrap();

    assert_eq!(doc.operations_for_scope("global").len(), 2);
    assert_eq!(doc.operations_for_scope("global")[1].index, 1);
    assert_eq!(doc.header.revision_of("global"), 2);
}

#[test]
fn mock_reducer_keeps_scopes_independent() {
    let reducer = MockReducer::new();
    let doc = document("notes/todo");

    let doc = reducer
        .apply(&doc, &Action::custom("A", "global", json!(1)).unwrap())
        .unwrap();
    let doc = reducer
        .apply(&doc, &Action::custom("B", "local", json!(2)).unwrap())
        .unwrap();

    assert_eq!(doc.operations_for_scope("global").len(), 1);
    assert_eq!(doc.operations_for_scope("local").len(), 1);
    assert_eq!(doc.operations_for_scope("local")[0].index, 0);
    assert_eq!(doc.state.global, json!(1));
    assert_eq!(doc.state.local, json!(2));
}

#[test]
fn failing_reducer_surfaces_its_message() {
    let reducer = MockReducer::failing("schema rejected the input");
    let doc = document("notes/todo");
    let action = Action::custom("SET_TITLE", "global", json!({})).unwrap();

    let err = reducer.apply(&doc, &action).unwrap_err();
    assert_eq!(err.to_string(), "schema rejected the input");
}

#[test]
fn stalled_reducer_returns_the_document_unchanged() {
    let reducer = MockReducer::stalled();
    let doc = document("notes/todo");
    let action = Action::custom("SET_TITLE", "global", json!({})).unwrap();

    let unchanged = reducer.apply(&doc, &action).unwrap();
    assert_eq!(unchanged, doc);
    assert!(unchanged.operations_for_scope("global").is_empty());
}

#[test]
fn mock_reducer_records_applied_actions() {
    let reducer = MockReducer::new();
    let doc = document("notes/todo");

    let first = Action::custom("A", "global", json!(1)).unwrap();
    let second = Action::custom("B", "global", json!(2)).unwrap();
    let doc = reducer.apply(&doc, &first).unwrap();
    reducer.apply(&doc, &second).unwrap();

    assert_eq!(reducer.applied_actions(), vec![first.id, second.id]);
}
