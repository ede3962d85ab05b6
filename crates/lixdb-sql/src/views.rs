//! Entity-view name resolution and the metadata columns each variant
//! exposes.
//!
//! A registered schema generates up to three logical relations:
//! `<key>` (current version only), `<key>_all` (every version), and
//! `<key>_history` (commit-ancestry walk). The rewriter maps those names
//! back to the schema and variant here.

use std::sync::Arc;

use lixdb_commons::{LixCol, Relations, SchemaDefinition};

/// The three generated view shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewVariant {
    /// Current state, pinned to the active version.
    Base,
    /// Current state across all versions.
    ByVersion,
    /// Point-in-time ancestry walk over the ledger.
    History,
}

impl ViewVariant {
    /// The primitive relation backing this variant.
    pub fn backing_relation(&self) -> &'static str {
        match self {
            ViewVariant::Base | ViewVariant::ByVersion => Relations::STATE_BY_VERSION,
            ViewVariant::History => Relations::STATE_HISTORY,
        }
    }

    /// Whether a schema has this variant enabled.
    pub fn enabled_for(&self, def: &SchemaDefinition) -> bool {
        match self {
            ViewVariant::Base => def.variants.base,
            ViewVariant::ByVersion => def.variants.by_version,
            ViewVariant::History => def.variants.history,
        }
    }
}

/// Suffix of the by-version variant.
pub const ALL_SUFFIX: &str = "_all";
/// Suffix of the history variant.
pub const HISTORY_SUFFIX: &str = "_history";

/// Schema lookup the rewriter depends on; implemented by the core
/// registry. Unknown keys are `None`, never an error.
pub trait ViewSchemaResolver {
    fn resolve_view_schema(&self, key: &str) -> Option<Arc<SchemaDefinition>>;
}

/// Resolves a table name to a schema and view variant.
///
/// An exact schema-key match wins (its base view), then the `_all` and
/// `_history` suffix interpretations are tried. Names that resolve to a
/// schema with the variant disabled do not match at all, so the rewriter
/// leaves them untouched.
pub fn resolve_view_reference(
    name: &str,
    resolver: &dyn ViewSchemaResolver,
) -> Option<(Arc<SchemaDefinition>, ViewVariant)> {
    let mut candidates: Vec<(&str, ViewVariant)> = vec![(name, ViewVariant::Base)];
    if let Some(base) = name.strip_suffix(ALL_SUFFIX) {
        candidates.push((base, ViewVariant::ByVersion));
    }
    if let Some(base) = name.strip_suffix(HISTORY_SUFFIX) {
        candidates.push((base, ViewVariant::History));
    }

    for (key, variant) in candidates {
        if let Some(def) = resolver.resolve_view_schema(key) {
            if variant.enabled_for(&def) {
                return Some((def, variant));
            }
        }
    }
    None
}

/// Metadata columns a variant exposes, as `(lixcol name, backing expression)`
/// pairs over the variant's primitive relation.
pub fn metadata_columns(variant: ViewVariant) -> Vec<(&'static str, &'static str)> {
    match variant {
        ViewVariant::Base => vec![
            (LixCol::ENTITY_ID, "entity_id"),
            (LixCol::SCHEMA_KEY, "schema_key"),
            (LixCol::SCHEMA_VERSION, "schema_version"),
            (LixCol::FILE_ID, "file_id"),
            (LixCol::PLUGIN_KEY, "plugin_key"),
            (LixCol::CHANGE_ID, "change_id"),
            (LixCol::CREATED_AT, "created_at"),
            (LixCol::UPDATED_AT, "updated_at"),
            (
                LixCol::INHERITED_FROM_VERSION_ID,
                "inherited_from_version_id",
            ),
        ],
        ViewVariant::ByVersion => {
            let mut columns = metadata_columns(ViewVariant::Base);
            columns.push((LixCol::VERSION_ID, "version_id"));
            columns
        }
        ViewVariant::History => vec![
            (LixCol::ENTITY_ID, "entity_id"),
            (LixCol::SCHEMA_KEY, "schema_key"),
            (LixCol::SCHEMA_VERSION, "schema_version"),
            (LixCol::FILE_ID, "file_id"),
            (LixCol::PLUGIN_KEY, "plugin_key"),
            (LixCol::CHANGE_ID, "change_id"),
            (LixCol::COMMIT_ID, "commit_id"),
            (LixCol::ROOT_COMMIT_ID, "root_commit_id"),
            (LixCol::DEPTH, "depth"),
            (LixCol::METADATA, "metadata"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lixdb_commons::SchemaKey;
    use std::collections::HashMap;

    struct MapResolver(HashMap<String, Arc<SchemaDefinition>>);

    impl ViewSchemaResolver for MapResolver {
        fn resolve_view_schema(&self, key: &str) -> Option<Arc<SchemaDefinition>> {
            self.0.get(key).cloned()
        }
    }

    fn resolver_with(keys: &[&str]) -> MapResolver {
        let mut map = HashMap::new();
        for key in keys {
            map.insert(
                key.to_string(),
                Arc::new(SchemaDefinition::new(SchemaKey::new(*key), "1.0")),
            );
        }
        MapResolver(map)
    }

    #[test]
    fn test_resolve_variants() {
        let resolver = resolver_with(&["doc"]);
        let (_, variant) = resolve_view_reference("doc", &resolver).expect("base");
        assert_eq!(variant, ViewVariant::Base);
        let (_, variant) = resolve_view_reference("doc_all", &resolver).expect("all");
        assert_eq!(variant, ViewVariant::ByVersion);
        let (_, variant) = resolve_view_reference("doc_history", &resolver).expect("history");
        assert_eq!(variant, ViewVariant::History);
        assert!(resolve_view_reference("other", &resolver).is_none());
    }

    #[test]
    fn test_exact_key_wins_over_suffix() {
        // a schema literally named doc_all: its base view shadows doc's
        // by-version view
        let resolver = resolver_with(&["doc", "doc_all"]);
        let (def, variant) = resolve_view_reference("doc_all", &resolver).expect("resolve");
        assert_eq!(def.key.as_str(), "doc_all");
        assert_eq!(variant, ViewVariant::Base);
    }

    #[test]
    fn test_disabled_variant_does_not_match() {
        let mut def = SchemaDefinition::new(SchemaKey::new("doc"), "1.0");
        def.variants.history = false;
        let mut map = HashMap::new();
        map.insert("doc".to_string(), Arc::new(def));
        let resolver = MapResolver(map);
        assert!(resolve_view_reference("doc_history", &resolver).is_none());
        assert!(resolve_view_reference("doc", &resolver).is_some());
    }
}
