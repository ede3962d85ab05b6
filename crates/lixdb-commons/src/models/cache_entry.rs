//! Write-through cache entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{ChangeId, EntityId, FileId, SchemaKey, VersionId};

/// One row of the write-through state cache.
///
/// Entries exist only for rows a version *owns* (including local
/// tombstones, stored with `snapshot_content = None`); inherited rows are
/// resolved at read time by falling through to the ancestor's entry. The
/// whole cache may be dropped and rebuilt from the ledger at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version_id: VersionId,
    pub entity_id: EntityId,
    pub schema_key: SchemaKey,
    pub file_id: FileId,
    pub plugin_key: String,
    pub schema_version: String,
    pub snapshot_content: Option<Value>,
    pub change_id: ChangeId,
    pub created_at: String,
    pub updated_at: String,
}

impl CacheEntry {
    /// Whether this entry shadows the entity with a deletion.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.snapshot_content.is_none()
    }
}
