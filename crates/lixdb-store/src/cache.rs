//! Write-through state cache table access.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use lixdb_commons::{CacheEntry, ChangeId, EntityId, FileId, SchemaKey, VersionId};

use crate::error::StoreError;

/// Inserts or replaces the entry for an owned row.
pub fn upsert_entry(conn: &Connection, entry: &CacheEntry) -> Result<(), StoreError> {
    let snapshot = entry
        .snapshot_content
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT OR REPLACE INTO state_cache
             (version_id, entity_id, schema_key, file_id, plugin_key,
              schema_version, snapshot_content, change_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.version_id.as_str(),
            entry.entity_id.as_str(),
            entry.schema_key.as_str(),
            entry.file_id.as_str(),
            entry.plugin_key,
            entry.schema_version,
            snapshot,
            entry.change_id.as_str(),
            entry.created_at,
            entry.updated_at,
        ],
    )?;
    Ok(())
}

/// The entry a version owns for one entity key, tombstones included.
pub fn get_entry(
    conn: &Connection,
    version_id: &VersionId,
    entity_id: &EntityId,
    schema_key: &SchemaKey,
    file_id: &FileId,
) -> Result<Option<CacheEntry>, StoreError> {
    conn.query_row(
        "SELECT version_id, entity_id, schema_key, file_id, plugin_key,
                schema_version, snapshot_content, change_id, created_at, updated_at
         FROM state_cache
         WHERE version_id = ?1 AND entity_id = ?2 AND schema_key = ?3 AND file_id = ?4",
        params![
            version_id.as_str(),
            entity_id.as_str(),
            schema_key.as_str(),
            file_id.as_str(),
        ],
        map_raw,
    )
    .optional()?
    .map(finish_entry)
    .transpose()
}

/// Entries a version owns, optionally narrowed by key components.
pub fn entries_filtered(
    conn: &Connection,
    version_id: &VersionId,
    entity_id: Option<&EntityId>,
    schema_key: Option<&SchemaKey>,
    file_id: Option<&FileId>,
) -> Result<Vec<CacheEntry>, StoreError> {
    let mut sql = String::from(
        "SELECT version_id, entity_id, schema_key, file_id, plugin_key,
                schema_version, snapshot_content, change_id, created_at, updated_at
         FROM state_cache
         WHERE version_id = ?1",
    );
    let mut args: Vec<&str> = vec![version_id.as_str()];
    if let Some(entity_id) = entity_id {
        args.push(entity_id.as_str());
        sql.push_str(&format!(" AND entity_id = ?{}", args.len()));
    }
    if let Some(schema_key) = schema_key {
        args.push(schema_key.as_str());
        sql.push_str(&format!(" AND schema_key = ?{}", args.len()));
    }
    if let Some(file_id) = file_id {
        args.push(file_id.as_str());
        sql.push_str(&format!(" AND file_id = ?{}", args.len()));
    }
    sql.push_str(" ORDER BY schema_key, entity_id, file_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), map_raw)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(finish_entry(row?)?);
    }
    Ok(entries)
}

/// Drops every cache entry. The projection must be rebuilt before reads.
pub fn clear(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("DELETE FROM state_cache", [])?;
    Ok(())
}

/// Number of cached entries (tombstones included).
pub fn len(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM state_cache", [], |row| row.get(0))?)
}

struct RawEntry {
    version_id: String,
    entity_id: String,
    schema_key: String,
    file_id: String,
    plugin_key: String,
    schema_version: String,
    snapshot_content: Option<String>,
    change_id: String,
    created_at: String,
    updated_at: String,
}

fn map_raw(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        version_id: row.get(0)?,
        entity_id: row.get(1)?,
        schema_key: row.get(2)?,
        file_id: row.get(3)?,
        plugin_key: row.get(4)?,
        schema_version: row.get(5)?,
        snapshot_content: row.get(6)?,
        change_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn finish_entry(raw: RawEntry) -> Result<CacheEntry, StoreError> {
    let snapshot_content = raw
        .snapshot_content
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()?;
    Ok(CacheEntry {
        version_id: VersionId::new(raw.version_id),
        entity_id: EntityId::new(raw.entity_id),
        schema_key: SchemaKey::new(raw.schema_key),
        file_id: FileId::new(raw.file_id),
        plugin_key: raw.plugin_key,
        schema_version: raw.schema_version,
        snapshot_content,
        change_id: ChangeId::new(raw.change_id),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}
