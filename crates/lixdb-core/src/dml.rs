//! Routing of INSERT/UPDATE/DELETE statements whose target is an entity
//! view into state-store mutations.
//!
//! The UI layer only ever talks SQL, so writes against view names have to
//! become ledger mutations: INSERT builds the snapshot from the property
//! columns, UPDATE and DELETE first resolve the matching rows through the
//! rewritten view and then mutate row by row. Only literal values are
//! accepted in VALUES and SET; the history variant is read-only.

use std::sync::Arc;

use serde_json::{Map, Value};
use sqlparser::ast::{
    AssignmentTarget, Expr, ObjectName, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, UnaryOperator, Value as AstValue,
};

use lixdb_commons::{EntityId, FileId, LixCol, SchemaDefinition, VersionId};
use lixdb_sql::rewriter::delete_target_name;
use lixdb_sql::ViewVariant;

use crate::engine::{Engine, ExecutionResult};
use crate::error::{LixError, Result};
use crate::schema_registry::validate_snapshot;
use crate::state::{NewStateRow, StateFilter, StatePatch};

/// The single-part table name a DML statement targets, if any.
pub(crate) fn dml_target_name(stmt: &Statement) -> Option<String> {
    match stmt {
        Statement::Insert(insert) => match &insert.table {
            TableObject::TableName(name) => single_part(name),
            _ => None,
        },
        Statement::Update { table, .. } => {
            if !table.joins.is_empty() {
                return None;
            }
            match &table.relation {
                TableFactor::Table { name, .. } => single_part(name),
                _ => None,
            }
        }
        Statement::Delete(delete) => delete_target_name(&delete.from).and_then(single_part),
        _ => None,
    }
}

fn single_part(name: &ObjectName) -> Option<String> {
    if name.0.len() != 1 {
        return None;
    }
    name.0
        .last()
        .and_then(ObjectNamePart::as_ident)
        .map(|ident| ident.value.to_ascii_lowercase())
}

pub(crate) fn execute_insert(
    engine: &Engine,
    stmt: &Statement,
    def: Arc<SchemaDefinition>,
    variant: ViewVariant,
) -> Result<ExecutionResult> {
    reject_history(variant)?;
    let Statement::Insert(insert) = stmt else {
        return Err(LixError::invalid_operation("expected an INSERT statement"));
    };
    if insert.columns.is_empty() {
        return Err(LixError::invalid_operation(
            "INSERT into an entity view requires an explicit column list",
        ));
    }
    let Some(source) = &insert.source else {
        return Err(LixError::invalid_operation(
            "INSERT into an entity view requires a VALUES clause",
        ));
    };
    let SetExpr::Values(values) = source.body.as_ref() else {
        return Err(LixError::invalid_operation(
            "only VALUES inserts are supported on entity views",
        ));
    };

    let names: Vec<String> = insert
        .columns
        .iter()
        .map(|ident| ident.value.clone())
        .collect();
    let mut pending = Vec::with_capacity(values.rows.len());
    for row in &values.rows {
        if row.len() != names.len() {
            return Err(LixError::invalid_operation(format!(
                "INSERT row has {} value(s) for {} column(s)",
                row.len(),
                names.len()
            )));
        }
        pending.push(build_insert_row(&def, &names, row)?);
    }

    // validate the whole batch before the first mutation commits
    for row in &pending {
        validate_snapshot(&def, &row.snapshot_content)?;
    }

    let inserted = pending.len();
    for row in pending {
        engine.state().insert(row)?;
    }
    Ok(ExecutionResult::affected(inserted))
}

fn build_insert_row(
    def: &SchemaDefinition,
    names: &[String],
    exprs: &[Expr],
) -> Result<NewStateRow> {
    let mut snapshot = Map::new();
    let mut entity_id: Option<EntityId> = None;
    let mut file_id: Option<FileId> = None;
    let mut version_id: Option<VersionId> = None;
    let mut plugin_key: Option<String> = None;
    let mut metadata: Option<Value> = None;

    for (name, expr) in names.iter().zip(exprs) {
        let value = literal_value(expr)?;
        let lower = name.to_ascii_lowercase();
        if !LixCol::is_metadata_column(&lower) {
            snapshot.insert(name.clone(), value);
            continue;
        }
        if lower == LixCol::ENTITY_ID {
            entity_id = Some(EntityId::new(scalar_to_string(&value, name)?));
        } else if lower == LixCol::FILE_ID {
            file_id = Some(FileId::new(scalar_to_string(&value, name)?));
        } else if lower == LixCol::VERSION_ID {
            version_id = Some(VersionId::new(scalar_to_string(&value, name)?));
        } else if lower == LixCol::PLUGIN_KEY {
            plugin_key = Some(scalar_to_string(&value, name)?);
        } else if lower == LixCol::METADATA {
            metadata = Some(value);
        } else {
            return Err(LixError::invalid_operation(format!(
                "column '{name}' is not writable"
            )));
        }
    }

    let snapshot = Value::Object(snapshot);
    let entity_id = match entity_id {
        Some(id) => id,
        None => derive_entity_id(def, &snapshot)?,
    };

    let mut row = NewStateRow::new(def.key.clone(), entity_id, snapshot);
    row.schema_version = Some(def.version.clone());
    if let Some(file_id) = file_id {
        row.file_id = file_id;
    }
    row.version_id = version_id;
    row.plugin_key = plugin_key;
    row.metadata = metadata;
    Ok(row)
}

/// Entity id from the primary-key property values; composite keys join
/// their parts.
fn derive_entity_id(def: &SchemaDefinition, snapshot: &Value) -> Result<EntityId> {
    let mut parts = Vec::with_capacity(def.primary_key.len());
    for property in &def.primary_key {
        let value = snapshot.get(property).ok_or_else(|| {
            LixError::schema_validation(
                def.key.as_str(),
                property,
                "primary-key property missing from INSERT",
            )
        })?;
        parts.push(scalar_to_string(value, property)?);
    }
    Ok(EntityId::from_key_parts(&parts))
}

pub(crate) fn execute_update(
    engine: &Engine,
    stmt: &Statement,
    view_name: &str,
    def: Arc<SchemaDefinition>,
    variant: ViewVariant,
) -> Result<ExecutionResult> {
    reject_history(variant)?;
    let Statement::Update {
        assignments,
        selection,
        ..
    } = stmt
    else {
        return Err(LixError::invalid_operation("expected an UPDATE statement"));
    };

    let mut patch = StatePatch::new();
    for assignment in assignments {
        let AssignmentTarget::ColumnName(column_name) = &assignment.target else {
            return Err(LixError::invalid_operation(
                "tuple assignments are not supported on entity views",
            ));
        };
        let Some(terminal) = column_name.0.last().and_then(ObjectNamePart::as_ident) else {
            continue;
        };
        if LixCol::is_metadata_column(&terminal.value) {
            return Err(LixError::invalid_operation(format!(
                "metadata column '{}' is read-only",
                terminal.value
            )));
        }
        patch = patch.set(terminal.value.clone(), literal_value(&assignment.value)?);
    }

    let targets = resolve_target_rows(engine, view_name, variant, selection.as_ref())?;
    let mut affected = 0;
    for (entity_id, file_id, version_id) in targets {
        let filter = StateFilter {
            version_id: Some(version_id),
            schema_key: Some(def.key.clone()),
            entity_id: Some(entity_id),
            file_id: Some(file_id),
        };
        affected += engine.state().update(&filter, &patch)?.len();
    }
    Ok(ExecutionResult::affected(affected))
}

pub(crate) fn execute_delete(
    engine: &Engine,
    stmt: &Statement,
    view_name: &str,
    def: Arc<SchemaDefinition>,
    variant: ViewVariant,
) -> Result<ExecutionResult> {
    reject_history(variant)?;
    let Statement::Delete(delete) = stmt else {
        return Err(LixError::invalid_operation("expected a DELETE statement"));
    };

    let targets = resolve_target_rows(engine, view_name, variant, delete.selection.as_ref())?;
    let mut affected = 0;
    for (entity_id, file_id, version_id) in targets {
        let filter = StateFilter {
            version_id: Some(version_id),
            schema_key: Some(def.key.clone()),
            entity_id: Some(entity_id),
            file_id: Some(file_id),
        };
        affected += engine.state().delete(&filter)?;
    }
    Ok(ExecutionResult::affected(affected))
}

/// Runs the statement's WHERE clause through the regular rewritten-view
/// read path and returns the key of every matching row.
fn resolve_target_rows(
    engine: &Engine,
    view_name: &str,
    variant: ViewVariant,
    selection: Option<&Expr>,
) -> Result<Vec<(EntityId, FileId, VersionId)>> {
    let mut sql = match variant {
        ViewVariant::ByVersion => format!(
            "SELECT {}, {}, {} FROM {view_name}",
            LixCol::ENTITY_ID,
            LixCol::FILE_ID,
            LixCol::VERSION_ID
        ),
        _ => format!(
            "SELECT {}, {} FROM {view_name}",
            LixCol::ENTITY_ID,
            LixCol::FILE_ID
        ),
    };
    if let Some(selection) = selection {
        sql.push_str(&format!(" WHERE {selection}"));
    }

    let output = engine.query_internal(&sql)?;
    let active = engine.active_version()?;
    let mut targets = Vec::with_capacity(output.rows.len());
    for row in output.rows {
        let entity = row
            .get(LixCol::ENTITY_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| LixError::invalid_operation("row without an entity id"))?;
        let file = row
            .get(LixCol::FILE_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| LixError::invalid_operation("row without a file id"))?;
        let version = match variant {
            ViewVariant::ByVersion => row
                .get(LixCol::VERSION_ID)
                .and_then(Value::as_str)
                .map(VersionId::new)
                .ok_or_else(|| LixError::invalid_operation("row without a version id"))?,
            _ => active.clone(),
        };
        targets.push((EntityId::new(entity), FileId::new(file), version));
    }
    Ok(targets)
}

fn reject_history(variant: ViewVariant) -> Result<()> {
    if variant == ViewVariant::History {
        return Err(LixError::invalid_operation("history views are read-only"));
    }
    Ok(())
}

/// Extracts a JSON value from a literal SQL expression. Anything beyond
/// plain literals (and negated numbers) is rejected so a failed statement
/// never half-commits.
fn literal_value(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Value(value) => match &value.value {
            AstValue::SingleQuotedString(s) | AstValue::DoubleQuotedString(s) => {
                Ok(Value::String(s.clone()))
            }
            AstValue::Number(text, _) => parse_number(text),
            AstValue::Boolean(b) => Ok(Value::Bool(*b)),
            AstValue::Null => Ok(Value::Null),
            other => Err(LixError::invalid_operation(format!(
                "unsupported literal in entity-view DML: {other}"
            ))),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal_value(expr)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(-i))
                } else if let Some(f) = n.as_f64() {
                    Ok(serde_json::Number::from_f64(-f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null))
                } else {
                    Err(LixError::invalid_operation("unsupported numeric literal"))
                }
            }
            _ => Err(LixError::invalid_operation(
                "unary minus applies only to numbers",
            )),
        },
        other => Err(LixError::invalid_operation(format!(
            "unsupported expression in entity-view DML: {other}"
        ))),
    }
}

fn parse_number(text: &str) -> Result<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| LixError::invalid_operation(format!("invalid numeric literal '{text}'")))
}

fn scalar_to_string(value: &Value, property: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(LixError::invalid_operation(format!(
            "property '{property}' cannot be used as a key part: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lixdb_commons::{PropertyType, SchemaKey};
    use serde_json::json;

    fn parse_projected_expr(sql: &str) -> Expr {
        let stmt = lixdb_sql::parse_sql(&format!("SELECT {sql}")).expect("parse");
        match &stmt[0] {
            Statement::Query(query) => match query.body.as_ref() {
                SetExpr::Select(select) => match &select.projection[0] {
                    sqlparser::ast::SelectItem::UnnamedExpr(expr) => expr.clone(),
                    _ => panic!("expected unnamed expression"),
                },
                _ => panic!("expected select"),
            },
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_literal_values() {
        assert_eq!(literal_value(&parse_projected_expr("'x'")).unwrap(), json!("x"));
        assert_eq!(literal_value(&parse_projected_expr("42")).unwrap(), json!(42));
        assert_eq!(literal_value(&parse_projected_expr("-7")).unwrap(), json!(-7));
        assert_eq!(literal_value(&parse_projected_expr("1.5")).unwrap(), json!(1.5));
        assert_eq!(
            literal_value(&parse_projected_expr("TRUE")).unwrap(),
            json!(true)
        );
        assert_eq!(
            literal_value(&parse_projected_expr("NULL")).unwrap(),
            json!(null)
        );
        assert!(literal_value(&parse_projected_expr("1 + 1")).is_err());
    }

    #[test]
    fn test_derive_entity_id_composite() {
        let def = SchemaDefinition::new(SchemaKey::new("pair"), "1.0")
            .with_property("a", PropertyType::String)
            .with_property("b", PropertyType::Integer)
            .with_primary_key(vec!["a", "b"]);
        let id = derive_entity_id(&def, &json!({"a": "x", "b": 2})).expect("derive");
        assert_eq!(id.as_str(), "x,2");
    }

    #[test]
    fn test_derive_entity_id_missing_pk() {
        let def = SchemaDefinition::new(SchemaKey::new("doc"), "1.0")
            .with_property("id", PropertyType::String)
            .with_primary_key(vec!["id"]);
        let err = derive_entity_id(&def, &json!({})).expect_err("missing");
        assert!(matches!(err, LixError::SchemaValidation { .. }));
    }
}
