//! Read-path resolution: cache entries through the inheritance chain.
//!
//! Every helper takes an open connection so it composes with mutation
//! transactions without re-entering the store mutex.

use std::collections::BTreeMap;

use rusqlite::Connection;

use lixdb_commons::{CacheEntry, EntityId, FileId, SchemaKey, StateRow, VersionId};
use lixdb_store::cache;

use crate::error::Result;

/// A cache entry resolved for a requested version: the entry itself, the
/// ancestor that owns it, and its distance up the inheritance chain.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRow {
    pub entry: CacheEntry,
    pub owner: VersionId,
    pub depth: usize,
}

impl ResolvedRow {
    /// Converts to the caller-visible state row. Tombstones resolve to
    /// `None`.
    pub fn into_state_row(self, requested: &VersionId) -> Option<StateRow> {
        let snapshot_content = self.entry.snapshot_content?;
        Some(StateRow {
            entity_id: self.entry.entity_id,
            file_id: self.entry.file_id,
            schema_key: self.entry.schema_key,
            version_id: requested.clone(),
            snapshot_content,
            plugin_key: self.entry.plugin_key,
            schema_version: self.entry.schema_version,
            created_at: self.entry.created_at,
            updated_at: self.entry.updated_at,
            inherited_from_version_id: if self.depth == 0 {
                None
            } else {
                Some(self.owner)
            },
            change_id: self.entry.change_id,
        })
    }
}

/// Resolves one entity key through the chain: nearest ancestor wins, and a
/// tombstone there shadows anything further up.
pub(crate) fn resolve_key(
    conn: &Connection,
    chain: &[VersionId],
    entity_id: &EntityId,
    schema_key: &SchemaKey,
    file_id: &FileId,
) -> Result<Option<ResolvedRow>> {
    for (depth, ancestor) in chain.iter().enumerate() {
        if let Some(entry) = cache::get_entry(conn, ancestor, entity_id, schema_key, file_id)? {
            return Ok(Some(ResolvedRow {
                entry,
                owner: ancestor.clone(),
                depth,
            }));
        }
    }
    Ok(None)
}

/// Resolves every entity key visible through the chain that matches the
/// optional filters. Tombstones are included so callers can distinguish
/// "deleted here" from "absent".
pub(crate) fn resolve_filtered(
    conn: &Connection,
    chain: &[VersionId],
    entity_id: Option<&EntityId>,
    schema_key: Option<&SchemaKey>,
    file_id: Option<&FileId>,
) -> Result<Vec<ResolvedRow>> {
    let mut best: BTreeMap<(String, String, String), ResolvedRow> = BTreeMap::new();
    for (depth, ancestor) in chain.iter().enumerate() {
        for entry in cache::entries_filtered(conn, ancestor, entity_id, schema_key, file_id)? {
            let key = (
                entry.schema_key.as_str().to_string(),
                entry.entity_id.as_str().to_string(),
                entry.file_id.as_str().to_string(),
            );
            // first (nearest) definition wins
            best.entry(key).or_insert(ResolvedRow {
                entry,
                owner: ancestor.clone(),
                depth,
            });
        }
    }
    Ok(best.into_values().collect())
}
