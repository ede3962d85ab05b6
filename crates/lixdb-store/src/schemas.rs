//! Stored schema definitions, append-only per (key, version).

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use lixdb_commons::SchemaKey;

use crate::error::StoreError;

/// Persists a definition. Fails with [`StoreError::Duplicate`] when the
/// (key, version) pair already exists.
pub fn insert_schema(
    conn: &Connection,
    key: &SchemaKey,
    version: &str,
    definition_json: &str,
    created_at: &str,
) -> Result<(), StoreError> {
    let result = conn.execute(
        "INSERT INTO stored_schema (key, version, definition, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![key.as_str(), version, definition_json, created_at],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::duplicate(format!("schema {key} version {version}")))
        }
        Err(err) => Err(err.into()),
    }
}

/// Fetches one exact (key, version) definition.
pub fn get_schema(
    conn: &Connection,
    key: &SchemaKey,
    version: &str,
) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT definition FROM stored_schema WHERE key = ?1 AND version = ?2",
            params![key.as_str(), version],
            |row| row.get(0),
        )
        .optional()?)
}

/// The most recently registered definition for a key.
pub fn latest_schema(
    conn: &Connection,
    key: &SchemaKey,
) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT definition FROM stored_schema
             WHERE key = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            [key.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

/// Every stored definition in registration order, for registry warm-up.
pub fn all_definitions(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT definition FROM stored_schema ORDER BY created_at, rowid")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut definitions = Vec::new();
    for row in rows {
        definitions.push(row?);
    }
    Ok(definitions)
}
