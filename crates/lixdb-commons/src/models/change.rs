//! The immutable ledger entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{ChangeId, EntityId, FileId, SchemaKey};

/// One atomic entity mutation, append-only and immutable once written.
///
/// A `snapshot_content` of `None` records a deletion (tombstone). The ledger
/// is the source of truth: every queryable state row is derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub entity_id: EntityId,
    pub schema_key: SchemaKey,
    pub schema_version: String,
    pub file_id: FileId,
    pub plugin_key: String,
    pub snapshot_content: Option<Value>,
    /// RFC 3339, millisecond precision.
    pub created_at: String,
}

impl Change {
    /// Whether this change records a deletion.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.snapshot_content.is_none()
    }
}
