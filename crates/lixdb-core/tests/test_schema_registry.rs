use lixdb_commons::{PropertyType, SchemaDefinition, SchemaKey};
use lixdb_core::{Engine, LixError};
use serde_json::json;

fn doc_schema(version: &str) -> SchemaDefinition {
    SchemaDefinition::new(SchemaKey::new("doc"), version)
        .with_property("id", PropertyType::String)
        .with_property("value", PropertyType::String)
        .with_primary_key(vec!["id"])
}

#[test]
fn test_register_and_resolve() {
    let engine = Engine::open_in_memory().expect("open");
    engine.register_schema(doc_schema("1.0")).expect("register");

    let def = engine
        .registry()
        .resolve(&SchemaKey::new("doc"))
        .expect("resolve");
    assert_eq!(def.version, "1.0");
    assert_eq!(engine.registry().len(), 1);
}

#[test]
fn test_duplicate_registration_rejected() {
    let engine = Engine::open_in_memory().expect("open");
    engine.register_schema(doc_schema("1.0")).expect("first");

    let err = engine
        .register_schema(doc_schema("1.0"))
        .expect_err("duplicate");
    assert!(matches!(err, LixError::DuplicateSchema { .. }));
}

#[test]
fn test_latest_registration_wins() {
    let engine = Engine::open_in_memory().expect("open");
    engine.register_schema(doc_schema("1.0")).expect("v1");
    engine.register_schema(doc_schema("2.0")).expect("v2");

    let latest = engine
        .registry()
        .resolve(&SchemaKey::new("doc"))
        .expect("resolve");
    assert_eq!(latest.version, "2.0");

    let pinned = engine
        .registry()
        .resolve_at(&SchemaKey::new("doc"), "1.0")
        .expect("resolve_at");
    assert_eq!(pinned.version, "1.0");
}

#[test]
fn test_unresolved_schema_errors() {
    let engine = Engine::open_in_memory().expect("open");
    let err = engine
        .registry()
        .resolve(&SchemaKey::new("ghost"))
        .expect_err("unknown key");
    assert!(matches!(err, LixError::UnresolvedSchema { .. }));
    assert!(engine.registry().try_resolve("ghost").is_none());
}

#[test]
fn test_invalid_definition_rejected() {
    let engine = Engine::open_in_memory().expect("open");
    let no_pk = SchemaDefinition::new(SchemaKey::new("doc"), "1.0")
        .with_property("id", PropertyType::String);
    assert!(matches!(
        engine.register_schema(no_pk),
        Err(LixError::SchemaValidation { .. })
    ));
}

#[test]
fn test_foreign_keys_referencing() {
    let engine = Engine::open_in_memory().expect("open");
    engine.register_schema(doc_schema("1.0")).expect("doc");
    engine
        .register_schema(
            SchemaDefinition::new(SchemaKey::new("link"), "1.0")
                .with_property("id", PropertyType::String)
                .with_property("doc_id", PropertyType::String)
                .with_primary_key(vec!["id"])
                .with_foreign_key("doc_id", SchemaKey::new("doc"), "id"),
        )
        .expect("link");

    let referencing = engine
        .registry()
        .foreign_keys_referencing(&SchemaKey::new("doc"));
    assert_eq!(referencing.len(), 1);
    assert_eq!(referencing[0].0.key.as_str(), "link");
    assert_eq!(referencing[0].1.property, "doc_id");
}

#[test]
fn test_registration_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state.db");
    {
        let engine = Engine::open(&path).expect("open");
        engine.register_schema(doc_schema("1.0")).expect("register");
        engine
            .execute("INSERT INTO doc (id, value) VALUES ('e0', 'persisted')")
            .expect("insert");
    }

    let engine = Engine::open(&path).expect("reopen");
    let def = engine
        .registry()
        .resolve(&SchemaKey::new("doc"))
        .expect("resolve after reopen");
    assert_eq!(def.version, "1.0");
    let rows = engine.execute("SELECT value FROM doc").expect("select");
    assert_eq!(rows.rows[0]["value"], json!("persisted"));
}

#[test]
fn test_registration_invalidates_state_cache() {
    let engine = Engine::open_in_memory().expect("open");
    engine.register_schema(doc_schema("1.0")).expect("doc");
    engine
        .execute("INSERT INTO doc (id, value) VALUES ('e0', 'v')")
        .expect("insert");

    // registering another schema clears the cache; reads rebuild and
    // observe the same state
    engine
        .register_schema(
            SchemaDefinition::new(SchemaKey::new("other"), "1.0")
                .with_property("id", PropertyType::String)
                .with_primary_key(vec!["id"]),
        )
        .expect("other");
    let rows = engine.execute("SELECT value FROM doc").expect("select");
    assert_eq!(rows.rows[0]["value"], json!("v"));
}
