//! The materialized, per-version current value of an entity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{ChangeId, EntityId, FileId, SchemaKey, VersionId};

/// A resolved state row as seen by a specific version.
///
/// Never persisted as primary data: derived from the change ledger and the
/// version graph (materialized through the write-through cache).
/// `version_id` is always the *requested* version; `inherited_from_version_id`
/// names the owning ancestor when the row was resolved through inheritance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub entity_id: EntityId,
    pub file_id: FileId,
    pub schema_key: SchemaKey,
    pub version_id: VersionId,
    pub snapshot_content: Value,
    pub plugin_key: String,
    pub schema_version: String,
    pub created_at: String,
    pub updated_at: String,
    pub inherited_from_version_id: Option<VersionId>,
    pub change_id: ChangeId,
}

impl StateRow {
    /// Whether the requested version owns this row directly.
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.inherited_from_version_id.is_none()
    }
}
