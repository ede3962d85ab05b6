//! Version, change-set, and active-version records.

use rusqlite::{params, Connection, OptionalExtension, Row};

use lixdb_commons::{ChangeSetId, CommitId, Version, VersionId};

use crate::error::StoreError;

/// A change-set row.
#[derive(Debug, Clone)]
pub struct ChangeSetRecord {
    pub id: ChangeSetId,
    pub parent_id: Option<ChangeSetId>,
    /// Parent elements are visible through this set only up to this
    /// sequence number (captured when a shared set was forked).
    pub parent_cutoff_seq: Option<i64>,
}

pub fn insert_change_set(
    conn: &Connection,
    id: &ChangeSetId,
    parent: Option<&ChangeSetId>,
    parent_cutoff_seq: Option<i64>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO change_set (id, parent_id, parent_cutoff_seq) VALUES (?1, ?2, ?3)",
        params![id.as_str(), parent.map(ChangeSetId::as_str), parent_cutoff_seq],
    )?;
    Ok(())
}

pub fn get_change_set(
    conn: &Connection,
    id: &ChangeSetId,
) -> Result<Option<ChangeSetRecord>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, parent_id, parent_cutoff_seq FROM change_set WHERE id = ?1",
            [id.as_str()],
            |row| {
                Ok(ChangeSetRecord {
                    id: ChangeSetId::new(row.get::<_, String>(0)?),
                    parent_id: row.get::<_, Option<String>>(1)?.map(ChangeSetId::new),
                    parent_cutoff_seq: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Highest element sequence currently visible in a set (0 when empty).
pub fn max_element_seq(conn: &Connection, id: &ChangeSetId) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) FROM change_set_element WHERE change_set_id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )?)
}

/// How many versions other than `exclude` point at this change set.
pub fn sharing_version_count(
    conn: &Connection,
    change_set_id: &ChangeSetId,
    exclude: &VersionId,
) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM version WHERE change_set_id = ?1 AND id != ?2",
        params![change_set_id.as_str(), exclude.as_str()],
        |row| row.get(0),
    )?)
}

pub fn insert_version(conn: &Connection, version: &Version) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO version
             (id, name, change_set_id, inherits_from_version_id, tip_commit_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            version.id.as_str(),
            version.name,
            version.change_set_id.as_str(),
            version.inherits_from_version_id.as_ref().map(VersionId::as_str),
            version.tip_commit_id.as_ref().map(CommitId::as_str),
        ],
    )?;
    Ok(())
}

pub fn get_version(conn: &Connection, id: &VersionId) -> Result<Option<Version>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, change_set_id, inherits_from_version_id, tip_commit_id
             FROM version WHERE id = ?1",
            [id.as_str()],
            map_version,
        )
        .optional()?)
}

pub fn get_version_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<Version>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, change_set_id, inherits_from_version_id, tip_commit_id
             FROM version WHERE name = ?1",
            [name],
            map_version,
        )
        .optional()?)
}

pub fn list_versions(conn: &Connection) -> Result<Vec<Version>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, change_set_id, inherits_from_version_id, tip_commit_id
         FROM version ORDER BY id",
    )?;
    let rows = stmt.query_map([], map_version)?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

/// Direct children in the inheritance forest.
pub fn child_versions(conn: &Connection, id: &VersionId) -> Result<Vec<Version>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, change_set_id, inherits_from_version_id, tip_commit_id
         FROM version WHERE inherits_from_version_id = ?1",
    )?;
    let rows = stmt.query_map([id.as_str()], map_version)?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

/// Repoints a version at a (freshly forked) change set.
pub fn update_version_change_set(
    conn: &Connection,
    id: &VersionId,
    change_set_id: &ChangeSetId,
) -> Result<(), StoreError> {
    let updated = conn.execute(
        "UPDATE version SET change_set_id = ?2 WHERE id = ?1",
        params![id.as_str(), change_set_id.as_str()],
    )?;
    if updated == 0 {
        return Err(StoreError::not_found(format!("version {id}")));
    }
    Ok(())
}

pub fn update_version_tip(
    conn: &Connection,
    id: &VersionId,
    tip: &CommitId,
) -> Result<(), StoreError> {
    let updated = conn.execute(
        "UPDATE version SET tip_commit_id = ?2 WHERE id = ?1",
        params![id.as_str(), tip.as_str()],
    )?;
    if updated == 0 {
        return Err(StoreError::not_found(format!("version {id}")));
    }
    Ok(())
}

/// The caller's current version id.
pub fn get_active_version(conn: &Connection) -> Result<VersionId, StoreError> {
    let id: String = conn.query_row(
        "SELECT version_id FROM active_version WHERE slot = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(VersionId::new(id))
}

pub fn set_active_version(conn: &Connection, id: &VersionId) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE active_version SET version_id = ?1 WHERE slot = 1",
        [id.as_str()],
    )?;
    Ok(())
}

fn map_version(row: &Row<'_>) -> rusqlite::Result<Version> {
    Ok(Version {
        id: VersionId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        change_set_id: ChangeSetId::new(row.get::<_, String>(2)?),
        inherits_from_version_id: row.get::<_, Option<String>>(3)?.map(VersionId::new),
        tip_commit_id: row.get::<_, Option<String>>(4)?.map(CommitId::new),
    })
}
