//! Ledger access: changes, change-set elements, and commit chains.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use lixdb_commons::{Change, ChangeId, ChangeSetId, CommitId, EntityId, FileId, SchemaKey};

use crate::error::StoreError;

/// Appends one change to the ledger.
pub fn append_change(conn: &Connection, change: &Change) -> Result<(), StoreError> {
    let snapshot = change
        .snapshot_content
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO change
             (id, entity_id, schema_key, schema_version, file_id, plugin_key,
              snapshot_content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            change.id.as_str(),
            change.entity_id.as_str(),
            change.schema_key.as_str(),
            change.schema_version,
            change.file_id.as_str(),
            change.plugin_key,
            snapshot,
            change.created_at,
        ],
    )?;
    Ok(())
}

/// Appends a pointer element for a change into a change set.
///
/// Returns the journal sequence number of the new element.
pub fn append_element(
    conn: &Connection,
    change_set_id: &ChangeSetId,
    change: &Change,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO change_set_element
             (change_set_id, change_id, entity_id, schema_key, file_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            change_set_id.as_str(),
            change.id.as_str(),
            change.entity_id.as_str(),
            change.schema_key.as_str(),
            change.file_id.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Records a commit and its single change element.
pub fn append_commit(
    conn: &Connection,
    commit_id: &CommitId,
    change_set_id: &ChangeSetId,
    parent: Option<&CommitId>,
    change_id: &ChangeId,
    metadata: Option<&Value>,
    created_at: &str,
) -> Result<(), StoreError> {
    let metadata = metadata.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO commits (id, change_set_id, parent_commit_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            commit_id.as_str(),
            change_set_id.as_str(),
            parent.map(CommitId::as_str),
            metadata,
            created_at,
        ],
    )?;
    conn.execute(
        "INSERT INTO commit_element (commit_id, change_id) VALUES (?1, ?2)",
        params![commit_id.as_str(), change_id.as_str()],
    )?;
    Ok(())
}

/// Fetches a single change by id.
pub fn get_change(conn: &Connection, id: &ChangeId) -> Result<Option<Change>, StoreError> {
    conn.query_row(
        "SELECT id, entity_id, schema_key, schema_version, file_id, plugin_key,
                snapshot_content, created_at
         FROM change WHERE id = ?1",
        [id.as_str()],
        map_change,
    )
    .optional()?
    .map(finish_change)
    .transpose()
}

/// All ledger entries for one entity key, oldest first.
pub fn changes_for_entity(
    conn: &Connection,
    schema_key: &SchemaKey,
    entity_id: &EntityId,
    file_id: &FileId,
) -> Result<Vec<Change>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_id, schema_key, schema_version, file_id, plugin_key,
                snapshot_content, created_at
         FROM change
         WHERE schema_key = ?1 AND entity_id = ?2 AND file_id = ?3
         ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(
        params![schema_key.as_str(), entity_id.as_str(), file_id.as_str()],
        map_change,
    )?;
    let mut changes = Vec::new();
    for row in rows {
        changes.push(finish_change(row?)?);
    }
    Ok(changes)
}

/// A change-set element joined with its change, as produced by the rebuild
/// scan.
#[derive(Debug, Clone)]
pub struct ElementRecord {
    pub version_id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub seq: i64,
    pub change_id: String,
    pub snapshot_content: Option<String>,
    pub plugin_key: String,
    pub schema_version: String,
    pub change_created_at: String,
}

/// Scans, for every version, every element visible through its change-set
/// chain (honoring fork cutoffs), ordered so that per (version, entity key)
/// the last row is the live element.
///
/// Cutoffs make the ordering safe: elements a fork exposes from its parent
/// always precede the fork's own elements in `seq`.
pub fn visible_elements(conn: &Connection) -> Result<Vec<ElementRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE set_chain (version_id, change_set_id, cutoff) AS (
             SELECT v.id, v.change_set_id, NULL FROM version v
             UNION ALL
             SELECT sc.version_id, cs.parent_id,
                    CASE
                        WHEN sc.cutoff IS NULL THEN cs.parent_cutoff_seq
                        WHEN cs.parent_cutoff_seq IS NULL THEN sc.cutoff
                        WHEN cs.parent_cutoff_seq < sc.cutoff THEN cs.parent_cutoff_seq
                        ELSE sc.cutoff
                    END
             FROM set_chain sc
             JOIN change_set cs ON cs.id = sc.change_set_id
             WHERE cs.parent_id IS NOT NULL
         )
         SELECT sc.version_id, e.entity_id, e.schema_key, e.file_id, e.seq,
                c.id, c.snapshot_content, c.plugin_key, c.schema_version, c.created_at
         FROM set_chain sc
         JOIN change_set_element e ON e.change_set_id = sc.change_set_id
         JOIN change c ON c.id = e.change_id
         WHERE sc.cutoff IS NULL OR e.seq <= sc.cutoff
         ORDER BY sc.version_id, e.entity_id, e.schema_key, e.file_id, e.seq",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ElementRecord {
            version_id: row.get(0)?,
            entity_id: row.get(1)?,
            schema_key: row.get(2)?,
            file_id: row.get(3)?,
            seq: row.get(4)?,
            change_id: row.get(5)?,
            snapshot_content: row.get(6)?,
            plugin_key: row.get(7)?,
            schema_version: row.get(8)?,
            change_created_at: row.get(9)?,
        })
    })?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

struct RawChange {
    id: String,
    entity_id: String,
    schema_key: String,
    schema_version: String,
    file_id: String,
    plugin_key: String,
    snapshot_content: Option<String>,
    created_at: String,
}

fn map_change(row: &Row<'_>) -> rusqlite::Result<RawChange> {
    Ok(RawChange {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        schema_key: row.get(2)?,
        schema_version: row.get(3)?,
        file_id: row.get(4)?,
        plugin_key: row.get(5)?,
        snapshot_content: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn finish_change(raw: RawChange) -> Result<Change, StoreError> {
    let snapshot_content = raw
        .snapshot_content
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()?;
    Ok(Change {
        id: ChangeId::new(raw.id),
        entity_id: EntityId::new(raw.entity_id),
        schema_key: SchemaKey::new(raw.schema_key),
        schema_version: raw.schema_version,
        file_id: FileId::new(raw.file_id),
        plugin_key: raw.plugin_key,
        snapshot_content,
        created_at: raw.created_at,
    })
}
