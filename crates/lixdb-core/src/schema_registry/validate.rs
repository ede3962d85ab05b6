//! Structural validation of schema definitions and entity snapshots.

use serde_json::Value;

use lixdb_commons::{LixCol, SchemaDefinition};

use crate::error::LixError;

/// Checks a definition is internally consistent before registration.
pub fn validate_definition(def: &SchemaDefinition) -> Result<(), LixError> {
    for name in def.properties.keys() {
        if !is_valid_property_name(name) {
            return Err(LixError::schema_validation(
                def.key.as_str(),
                name,
                "property names must be plain identifiers",
            ));
        }
        if LixCol::is_metadata_column(name) {
            return Err(LixError::schema_validation(
                def.key.as_str(),
                name,
                "property names must not collide with lixcol_* metadata columns",
            ));
        }
    }
    if def.primary_key.is_empty() {
        return Err(LixError::schema_validation(
            def.key.as_str(),
            "primary_key",
            "a schema must declare at least one primary-key property",
        ));
    }
    for prop in def.primary_key.iter().chain(def.required.iter()) {
        if !def.properties.contains_key(prop) {
            return Err(LixError::schema_validation(
                def.key.as_str(),
                prop,
                "references a property the schema does not declare",
            ));
        }
    }
    for fk in &def.foreign_keys {
        if !def.properties.contains_key(&fk.property) {
            return Err(LixError::schema_validation(
                def.key.as_str(),
                &fk.property,
                "foreign key references a property the schema does not declare",
            ));
        }
    }
    Ok(())
}

/// Validates a snapshot against a definition: object shape, required
/// properties, declared types, and `additional_properties`.
///
/// Errors name the violating property and the expected type; nothing else
/// is inspected once the first violation is found.
pub fn validate_snapshot(def: &SchemaDefinition, snapshot: &Value) -> Result<(), LixError> {
    let Some(object) = snapshot.as_object() else {
        return Err(LixError::schema_validation(
            def.key.as_str(),
            "$",
            "snapshot must be a JSON object",
        ));
    };

    for (name, declared) in &def.properties {
        match object.get(name) {
            Some(Value::Null) | None => {
                if def.is_required(name) {
                    return Err(LixError::schema_validation(
                        def.key.as_str(),
                        name,
                        format!("required property of type {} is missing", declared.name()),
                    ));
                }
            }
            Some(value) => {
                if !declared.matches(value) {
                    return Err(LixError::schema_validation(
                        def.key.as_str(),
                        name,
                        format!("expected {}, got {}", declared.name(), json_type_name(value)),
                    ));
                }
            }
        }
    }

    if !def.additional_properties {
        if let Some(unknown) = object.keys().find(|k| !def.properties.contains_key(*k)) {
            return Err(LixError::schema_validation(
                def.key.as_str(),
                unknown,
                "schema does not allow additional properties",
            ));
        }
    }

    Ok(())
}

fn is_valid_property_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
