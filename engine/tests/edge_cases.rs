//! Edge case tests for tablesync-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use chrono::{TimeZone, Utc};
use serde_json::json;
use tablesync_engine::{
    record::placeholder_id, EngineState, Error, FailureOutcome, Fields, OperationId,
    OperationKind, Record, TableKey, Timestamp,
};

fn table() -> TableKey {
    "base1:tbl1".parse().unwrap()
}

fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

// ============================================================================
// Field Value Edge Cases
// ============================================================================

#[test]
fn empty_field_set() {
    let mut state = EngineState::new();
    let record = state.stage_create(
        &table(),
        Fields::new(),
        placeholder_id(),
        OperationId::new_v4(),
        ts(1000),
    );

    assert!(record.fields.is_empty());
    assert!(state.pending_operations()[0].payload.is_empty());
}

#[test]
fn unicode_and_nested_values_survive_persistence() {
    let mut state = EngineState::new();
    let values = fields(json!({
        "Name": "日本語テスト 🎉",
        "Notes": "Hello\nWorld\tTab",
        "Tags": ["a", "b"],
        "Address": {"City": "Zürich", "Zip": 8001},
        "Empty": null,
        "Big": i64::MAX,
    }));

    let record = state.stage_create(
        &table(),
        values.clone(),
        placeholder_id(),
        OperationId::new_v4(),
        ts(1000),
    );

    let restored = EngineState::from_json(&state.to_json().unwrap()).unwrap();
    let cached = restored.record(&table(), &record.id).unwrap();
    assert_eq!(cached.fields, values);
}

#[test]
fn very_long_string_field() {
    let mut state = EngineState::new();
    let long_string = "x".repeat(1024 * 1024);

    let record = state.stage_create(
        &table(),
        fields(json!({ "Name": long_string })),
        placeholder_id(),
        OperationId::new_v4(),
        ts(1000),
    );

    assert_eq!(
        record.fields["Name"].as_str().unwrap().len(),
        1024 * 1024
    );
}

// ============================================================================
// Table Key Edge Cases
// ============================================================================

#[test]
fn table_keys_with_unusual_characters() {
    for raw in ["app123:tbl456", "base-1:Table Name", "b:t/with/slashes"] {
        let key: TableKey = raw.parse().unwrap();
        assert_eq!(key.to_string(), raw);
    }
}

#[test]
fn malformed_table_keys() {
    for raw in ["", ":", "base", ":tbl", "base:"] {
        assert!(
            matches!(raw.parse::<TableKey>(), Err(Error::InvalidTableKey(_))),
            "accepted {raw:?}"
        );
    }
}

#[test]
fn same_record_id_in_different_tables() {
    let other: TableKey = "base1:tbl2".parse().unwrap();
    let mut state = EngineState::new();

    state.apply_confirmed(&table(), Record::new("rec1", fields(json!({"t": 1})), ts(1)));
    state.apply_confirmed(&other, Record::new("rec1", fields(json!({"t": 2})), ts(1)));
    state.stage_delete(&table(), "rec1", OperationId::new_v4(), ts(2));

    assert!(state.record(&table(), "rec1").is_none());
    assert_eq!(state.record(&other, "rec1").unwrap().fields["t"], 2);
    assert!(!state.has_pending_for(&other, "rec1"));
}

// ============================================================================
// Queue Edge Cases
// ============================================================================

#[test]
fn many_operations_keep_order() {
    let mut state = EngineState::new();
    let mut expected = Vec::new();

    for i in 0..1000 {
        let op_id = OperationId::new_v4();
        expected.push(op_id);
        state.stage_update(
            &table(),
            "rec1",
            fields(json!({ "n": i })),
            op_id,
            ts(i),
        );
    }

    let ids: Vec<_> = state.pending_operations().iter().map(|op| op.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(state.record(&table(), "rec1").unwrap().version, 1000);
}

#[test]
fn retry_ceiling_of_one_abandons_immediately() {
    let mut state = EngineState::new();
    let op_id = OperationId::new_v4();
    state.stage_delete(&table(), "rec1", op_id, ts(1));

    assert!(matches!(
        state.record_failure(op_id, "rejected", 1).unwrap(),
        FailureOutcome::Abandoned(_)
    ));
    assert_eq!(state.pending_count(), 0);
}

#[test]
fn confirm_unknown_operation() {
    let mut state = EngineState::new();
    let result = state.confirm(OperationId::new_v4(), None);
    assert!(matches!(result, Err(Error::OperationNotFound(_))));
}

#[test]
fn delete_of_uncached_record_still_queues() {
    let mut state = EngineState::new();
    let removed = state.stage_delete(&table(), "recUnknown", OperationId::new_v4(), ts(1));

    assert!(removed.is_none());
    assert_eq!(state.pending_count(), 1);
    assert_eq!(state.pending_operations()[0].kind, OperationKind::Delete);
}

// ============================================================================
// Placeholder Reconciliation Edge Cases
// ============================================================================

#[test]
fn server_id_already_cached_by_push() {
    let mut state = EngineState::new();
    let create_id = OperationId::new_v4();
    let placeholder = placeholder_id();

    state.stage_create(
        &table(),
        fields(json!({"Name": "A"})),
        placeholder.clone(),
        create_id,
        ts(1),
    );
    // A push notification delivered the new record before the create returned
    let pushed = Record::new("recServer", fields(json!({"Name": "A"})), ts(2));
    state.apply_confirmed(&table(), pushed.clone());

    state.confirm_create(create_id, pushed).unwrap();

    let records = state.records(&table());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "recServer");
}

#[test]
fn state_from_older_document_without_sync_time() {
    let json = r#"{
        "formatVersion": 1,
        "tables": {"base1:tbl1": [{"id": "rec1", "fields": {}, "createdTime": "2024-01-01T00:00:00Z", "version": 3}]},
        "pendingOperations": []
    }"#;

    let state = EngineState::from_json(json).unwrap();
    assert!(state.last_sync_timestamp.is_none());
    assert_eq!(state.record(&table(), "rec1").unwrap().version, 3);
}
