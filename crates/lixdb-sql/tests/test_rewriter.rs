//! Statement-level rewriting: expansion shapes, shadowing, pruning, and
//! the no-op guarantee.

use std::collections::HashMap;
use std::sync::Arc;

use lixdb_commons::{PropertyType, SchemaDefinition, SchemaKey};
use lixdb_sql::rewriter::EntityViewRewriter;
use lixdb_sql::views::ViewSchemaResolver;
use lixdb_sql::parse_sql;
use sqlparser::ast::Statement;

struct MapResolver(HashMap<String, Arc<SchemaDefinition>>);

impl ViewSchemaResolver for MapResolver {
    fn resolve_view_schema(&self, key: &str) -> Option<Arc<SchemaDefinition>> {
        self.0.get(key).cloned()
    }
}

fn doc_resolver() -> MapResolver {
    let doc = SchemaDefinition::new(SchemaKey::new("doc"), "1.0")
        .with_property("id", PropertyType::String)
        .with_property("title", PropertyType::String)
        .with_property("body", PropertyType::String)
        .with_primary_key(vec!["id"]);
    let tag = SchemaDefinition::new(SchemaKey::new("tag"), "1.0")
        .with_property("id", PropertyType::String)
        .with_property("label", PropertyType::String)
        .with_primary_key(vec!["id"]);
    let mut map = HashMap::new();
    map.insert("doc".to_string(), Arc::new(doc));
    map.insert("tag".to_string(), Arc::new(tag));
    MapResolver(map)
}

fn parse_one(sql: &str) -> Statement {
    parse_sql(sql).expect("parse").remove(0)
}

fn rewrite(sql: &str) -> String {
    let resolver = doc_resolver();
    let rewriter = EntityViewRewriter::new(&resolver);
    rewriter
        .rewrite_statement(parse_one(sql))
        .expect("rewrite")
        .to_string()
}

#[test]
fn test_no_op_for_statement_without_view_references() {
    let resolver = doc_resolver();
    let rewriter = EntityViewRewriter::new(&resolver);
    let sql = "SELECT a.x, b.y FROM plain a JOIN other b ON a.id = b.id WHERE a.x > 1";
    let original = parse_one(sql);
    let rewritten = rewriter
        .rewrite_statement(original.clone())
        .expect("rewrite");
    assert_eq!(rewritten, original);
}

#[test]
fn test_no_op_when_cte_shadows_view_name() {
    let resolver = doc_resolver();
    let rewriter = EntityViewRewriter::new(&resolver);
    let sql = "WITH doc AS (SELECT 1 AS x) SELECT x FROM doc";
    let original = parse_one(sql);
    let rewritten = rewriter
        .rewrite_statement(original.clone())
        .expect("rewrite");
    assert_eq!(rewritten, original);
}

#[test]
fn test_base_view_expands_to_state_by_version() {
    let rewritten = rewrite("SELECT title FROM doc");
    assert!(rewritten.contains("state_by_version"));
    assert!(rewritten.contains("schema_key = 'doc'"));
    assert!(rewritten.contains("SELECT version_id FROM active_version"));
    assert!(rewritten.contains("json_extract(snapshot_content"));
    // the derived table keeps resolving under the view name
    assert!(rewritten.contains("AS doc"));
}

#[test]
fn test_projection_pruned_to_used_columns() {
    let rewritten = rewrite("SELECT title FROM doc");
    assert!(rewritten.contains("\"title\""));
    assert!(!rewritten.contains("\"body\""));
    // the entity id column is always retained
    assert!(rewritten.contains("lixcol_entity_id"));
    assert!(!rewritten.contains("lixcol_updated_at"));
}

#[test]
fn test_wildcard_keeps_every_column() {
    let rewritten = rewrite("SELECT * FROM doc");
    for column in ["\"id\"", "\"title\"", "\"body\"", "lixcol_updated_at"] {
        assert!(rewritten.contains(column), "missing {column} in {rewritten}");
    }
}

#[test]
fn test_explicit_alias_is_preserved() {
    let rewritten = rewrite("SELECT d.title FROM doc AS d");
    assert!(rewritten.contains("AS d"));
    assert!(rewritten.contains("state_by_version"));
}

#[test]
fn test_by_version_variant_has_version_column_and_no_pin() {
    let rewritten = rewrite("SELECT lixcol_version_id FROM doc_all");
    assert!(rewritten.contains("state_by_version"));
    assert!(rewritten.contains("lixcol_version_id"));
    assert!(!rewritten.contains("active_version"));
}

#[test]
fn test_history_variant_targets_state_history() {
    let rewritten = rewrite("SELECT lixcol_depth FROM doc_history");
    assert!(rewritten.contains("state_history"));
    assert!(rewritten.contains("depth AS lixcol_depth"));
    assert!(!rewritten.contains("active_version"));
}

#[test]
fn test_join_of_two_views() {
    let rewritten =
        rewrite("SELECT d.title, t.label FROM doc d JOIN tag t ON t.id = d.id");
    assert!(rewritten.contains("schema_key = 'doc'"));
    assert!(rewritten.contains("schema_key = 'tag'"));
}

#[test]
fn test_subquery_in_where_is_rewritten() {
    let rewritten =
        rewrite("SELECT x FROM plain WHERE EXISTS (SELECT 1 FROM doc WHERE title = 'a')");
    assert!(rewritten.contains("state_by_version"));
    assert!(rewritten.contains("plain"));
}

#[test]
fn test_cte_body_is_rewritten() {
    let rewritten = rewrite("WITH titles AS (SELECT title FROM doc) SELECT title FROM titles");
    assert!(rewritten.contains("state_by_version"));
    assert!(rewritten.contains("titles"));
}

#[test]
fn test_set_operation_branches_are_rewritten() {
    let rewritten = rewrite("SELECT title FROM doc UNION SELECT label FROM tag");
    assert!(rewritten.contains("schema_key = 'doc'"));
    assert!(rewritten.contains("schema_key = 'tag'"));
}

#[test]
fn test_rewriting_is_idempotent() {
    let resolver = doc_resolver();
    let rewriter = EntityViewRewriter::new(&resolver);
    let once = rewriter
        .rewrite_statement(parse_one("SELECT title FROM doc"))
        .expect("first pass");
    let twice = rewriter
        .rewrite_statement(once.clone())
        .expect("second pass");
    assert_eq!(once, twice);
}

#[test]
fn test_rewritten_statement_reparses() {
    let rewritten = rewrite("SELECT d.title FROM doc d WHERE d.title LIKE 'a%' ORDER BY d.title");
    parse_sql(&rewritten).expect("rewritten SQL must parse");
}

#[test]
fn test_qualified_table_names_are_left_alone() {
    let resolver = doc_resolver();
    let rewriter = EntityViewRewriter::new(&resolver);
    let original = parse_one("SELECT title FROM main.doc");
    let rewritten = rewriter
        .rewrite_statement(original.clone())
        .expect("rewrite");
    assert_eq!(rewritten, original);
}

#[test]
fn test_version_pin_override() {
    let pinned = SchemaDefinition::new(SchemaKey::new("setting"), "1.0")
        .with_property("id", PropertyType::String)
        .with_property("value", PropertyType::String)
        .with_primary_key(vec!["id"])
        .with_lixcol_override("lixcol_version_id", serde_json::json!("global"));
    let mut map = HashMap::new();
    map.insert("setting".to_string(), Arc::new(pinned));
    let resolver = MapResolver(map);
    let rewriter = EntityViewRewriter::new(&resolver);

    let rewritten = rewriter
        .rewrite_statement(parse_one("SELECT value FROM setting"))
        .expect("rewrite")
        .to_string();
    assert!(rewritten.contains("version_id = 'global'"));
    assert!(!rewritten.contains("active_version"));
}

#[test]
fn test_insert_select_source_is_rewritten() {
    let rewritten = rewrite("INSERT INTO archive (title) SELECT title FROM doc");
    assert!(rewritten.contains("state_by_version"));
    assert!(rewritten.starts_with("INSERT INTO archive"));
}
