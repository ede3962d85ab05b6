use lixdb_commons::{EntityId, PropertyType, SchemaDefinition, SchemaKey};
use lixdb_core::{Engine, LixError, NewStateRow, StateFilter, StatePatch};
use serde_json::json;

fn doc_key() -> SchemaKey {
    SchemaKey::new("doc")
}

fn doc_schema() -> SchemaDefinition {
    SchemaDefinition::new(doc_key(), "1.0")
        .with_property("id", PropertyType::String)
        .with_property("value", PropertyType::String)
        .with_primary_key(vec!["id"])
}

fn test_engine() -> Engine {
    let engine = Engine::open_in_memory().expect("open engine");
    engine.register_schema(doc_schema()).expect("register doc");
    engine
}

fn insert_doc(engine: &Engine, id: &str, value: &str) {
    engine
        .state()
        .insert(NewStateRow::new(
            doc_key(),
            EntityId::new(id),
            json!({"id": id, "value": value}),
        ))
        .expect("insert doc");
}

fn select_docs(engine: &Engine) -> Vec<lixdb_commons::StateRow> {
    engine
        .state()
        .select(&StateFilter::for_schema(doc_key()))
        .expect("select docs")
}

#[test]
fn test_insert_select_roundtrip() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "hello");

    let rows = select_docs(&engine);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.snapshot_content["value"], json!("hello"));
    assert_eq!(row.version_id.as_str(), "global");
    assert!(row.is_owned());
    assert_eq!(row.created_at, row.updated_at);
}

#[test]
fn test_update_preserves_created_at() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "hello");
    let before = select_docs(&engine).remove(0);

    let updated = engine
        .state()
        .update(
            &StateFilter::for_schema(doc_key()).with_entity(EntityId::new("e0")),
            &StatePatch::new().set("value", json!("hello-updated")),
        )
        .expect("update doc");
    assert_eq!(updated.len(), 1);

    let rows = select_docs(&engine);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.snapshot_content["value"], json!("hello-updated"));
    assert_eq!(row.created_at, before.created_at);
    assert!(row.updated_at > before.updated_at);
    assert_ne!(row.change_id, before.change_id);
}

#[test]
fn test_updated_at_strictly_increases() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "v0");

    let mut previous = select_docs(&engine).remove(0).updated_at;
    for i in 1..5 {
        engine
            .state()
            .update(
                &StateFilter::for_schema(doc_key()),
                &StatePatch::new().set("value", json!(format!("v{i}"))),
            )
            .expect("update");
        let current = select_docs(&engine).remove(0).updated_at;
        assert!(current > previous, "{current} should sort after {previous}");
        previous = current;
    }
}

#[test]
fn test_delete_removes_row_but_retains_tombstone() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "hello");

    let deleted = engine
        .state()
        .delete(&StateFilter::for_schema(doc_key()).with_entity(EntityId::new("e0")))
        .expect("delete doc");
    assert_eq!(deleted, 1);
    assert!(select_docs(&engine).is_empty());

    // the ledger keeps both the insert and the tombstone
    let result = engine
        .execute("SELECT COUNT(*) AS n FROM \"change\" WHERE entity_id = 'e0'")
        .expect("ledger query");
    assert_eq!(result.rows[0]["n"], json!(2));
    let result = engine
        .execute(
            "SELECT COUNT(*) AS n FROM \"change\" \
             WHERE entity_id = 'e0' AND snapshot_content IS NULL",
        )
        .expect("tombstone query");
    assert_eq!(result.rows[0]["n"], json!(1));
}

#[test]
fn test_recreate_after_delete_starts_fresh_row() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "first");
    let first = select_docs(&engine).remove(0);

    engine
        .state()
        .delete(&StateFilter::for_schema(doc_key()))
        .expect("delete");
    insert_doc(&engine, "e0", "second");

    let rows = select_docs(&engine);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.snapshot_content["value"], json!("second"));
    assert_ne!(row.change_id, first.change_id);
    assert!(row.created_at > first.created_at);
}

#[test]
fn test_duplicate_insert_rejected() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "hello");

    let err = engine
        .state()
        .insert(NewStateRow::new(
            doc_key(),
            EntityId::new("e0"),
            json!({"id": "e0", "value": "again"}),
        ))
        .expect_err("duplicate insert");
    assert!(matches!(err, LixError::EntityAlreadyExists { .. }));
    // original row untouched
    assert_eq!(
        select_docs(&engine)[0].snapshot_content["value"],
        json!("hello")
    );
}

#[test]
fn test_validation_failure_commits_nothing() {
    let engine = test_engine();
    let measurement = SchemaDefinition::new(SchemaKey::new("measurement"), "1.0")
        .with_property("id", PropertyType::String)
        .with_property("value", PropertyType::Number)
        .with_primary_key(vec!["id"]);
    engine.register_schema(measurement).expect("register");

    let err = engine
        .state()
        .insert(NewStateRow::new(
            SchemaKey::new("measurement"),
            EntityId::new("m1"),
            json!({"id": "m1", "value": "not-a-number"}),
        ))
        .expect_err("invalid snapshot");
    let text = err.to_string();
    assert!(matches!(err, LixError::SchemaValidation { .. }));
    assert!(text.contains("'value'"));
    assert!(text.contains("expected number"));

    let rows = engine
        .state()
        .select(&StateFilter::for_schema(SchemaKey::new("measurement")))
        .expect("select");
    assert!(rows.is_empty());
    let ledger = engine
        .execute("SELECT COUNT(*) AS n FROM \"change\" WHERE schema_key = 'measurement'")
        .expect("ledger query");
    assert_eq!(ledger.rows[0]["n"], json!(0));
}

#[test]
fn test_update_re_validates_merged_snapshot() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "hello");

    let err = engine
        .state()
        .update(
            &StateFilter::for_schema(doc_key()),
            &StatePatch::new().set("value", json!(42)),
        )
        .expect_err("type violation on merge");
    assert!(matches!(err, LixError::SchemaValidation { .. }));
    // nothing committed
    assert_eq!(
        select_docs(&engine)[0].snapshot_content["value"],
        json!("hello")
    );
}

#[test]
fn test_unresolved_schema_blocks_mutation() {
    let engine = test_engine();
    let err = engine
        .state()
        .insert(NewStateRow::new(
            SchemaKey::new("ghost"),
            EntityId::new("g0"),
            json!({"id": "g0"}),
        ))
        .expect_err("unregistered schema");
    assert!(matches!(err, LixError::UnresolvedSchema { .. }));
    let ledger = engine
        .execute("SELECT COUNT(*) AS n FROM \"change\"")
        .expect("ledger query");
    assert_eq!(ledger.rows[0]["n"], json!(0));
}

#[test]
fn test_select_filters_by_entity_and_file() {
    let engine = test_engine();
    insert_doc(&engine, "e0", "a");
    insert_doc(&engine, "e1", "b");

    let all = select_docs(&engine);
    assert_eq!(all.len(), 2);

    let one = engine
        .state()
        .select(&StateFilter::for_schema(doc_key()).with_entity(EntityId::new("e1")))
        .expect("select one");
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].snapshot_content["value"], json!("b"));
}

#[test]
fn test_update_with_no_matches_is_empty() {
    let engine = test_engine();
    let updated = engine
        .state()
        .update(
            &StateFilter::for_schema(doc_key()).with_entity(EntityId::new("missing")),
            &StatePatch::new().set("value", json!("x")),
        )
        .expect("update nothing");
    assert!(updated.is_empty());
}
