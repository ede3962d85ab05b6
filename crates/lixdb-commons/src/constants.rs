//! Metadata column names, primitive relation names, and engine defaults.

/// Metadata columns exposed by every generated entity view.
///
/// These are the `lixcol_*` columns layered on top of the schema-defined
/// properties. Which subset a view exposes depends on its variant: the
/// timestamp and inheritance columns belong to `base`/`by_version`, the
/// commit lineage columns to `history`.
pub struct LixCol;

impl LixCol {
    pub const ENTITY_ID: &'static str = "lixcol_entity_id";
    pub const SCHEMA_KEY: &'static str = "lixcol_schema_key";
    pub const SCHEMA_VERSION: &'static str = "lixcol_schema_version";
    pub const FILE_ID: &'static str = "lixcol_file_id";
    pub const PLUGIN_KEY: &'static str = "lixcol_plugin_key";
    pub const CHANGE_ID: &'static str = "lixcol_change_id";
    pub const CREATED_AT: &'static str = "lixcol_created_at";
    pub const UPDATED_AT: &'static str = "lixcol_updated_at";
    pub const INHERITED_FROM_VERSION_ID: &'static str = "lixcol_inherited_from_version_id";
    pub const VERSION_ID: &'static str = "lixcol_version_id";
    pub const COMMIT_ID: &'static str = "lixcol_commit_id";
    pub const ROOT_COMMIT_ID: &'static str = "lixcol_root_commit_id";
    pub const DEPTH: &'static str = "lixcol_depth";
    pub const METADATA: &'static str = "lixcol_metadata";

    /// Check whether a column name is a metadata column (any variant).
    pub fn is_metadata_column(name: &str) -> bool {
        name.to_ascii_lowercase().starts_with("lixcol_")
    }
}

/// Primitive relations the rewriter targets and the engine maintains.
pub struct Relations;

impl Relations {
    /// Resolved per-version state, one row per visible entity per version.
    pub const STATE_BY_VERSION: &'static str = "state_by_version";

    /// Commit-ancestry walk over the change ledger.
    pub const STATE_HISTORY: &'static str = "state_history";

    /// Single-row indicator holding the caller's current version id.
    pub const ACTIVE_VERSION: &'static str = "active_version";
}

/// Engine-wide default identifiers.
pub struct Defaults;

impl Defaults {
    /// Id and name of the version seeded at bootstrap.
    pub const GLOBAL_VERSION_ID: &'static str = "global";
    pub const GLOBAL_VERSION_NAME: &'static str = "global";

    /// File id used when a mutation does not scope the entity to a file.
    pub const FILE_ID: &'static str = "global";

    /// Plugin key recorded for changes written through the engine itself.
    pub const PLUGIN_KEY: &'static str = "builtin";

    /// Separator for composite primary keys when deriving an entity id.
    pub const ENTITY_ID_SEPARATOR: &'static str = ",";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_metadata_column() {
        assert!(LixCol::is_metadata_column("lixcol_entity_id"));
        assert!(LixCol::is_metadata_column("LIXCOL_VERSION_ID"));
        assert!(!LixCol::is_metadata_column("title"));
        assert!(!LixCol::is_metadata_column("entity_id"));
    }
}
