//! The state store: per-version CRUD over the change ledger.
//!
//! Reads resolve through the write-through cache with inheritance
//! fall-through. Mutations append to the ledger, maintain the commit chain,
//! and write through the cache, all inside one transaction; inherited rows
//! are copied on write into the target version, never mutated in place.

pub mod fk;
pub mod materializer;
pub mod resolve;

use std::sync::Arc;

use rusqlite::Connection;
use serde_json::{Map, Value};

use lixdb_commons::{
    CacheEntry, Change, ChangeId, CommitId, Defaults, EntityId, FileId, MonotonicClock,
    SchemaKey, StateRow, Version, VersionId,
};
use lixdb_store::{cache, change_log, versions, Store};

pub use materializer::StateCacheManager;

use crate::error::{LixError, Result};
use crate::schema_registry::{validate_snapshot, SchemaRegistry};
use crate::state::resolve::ResolvedRow;
use crate::version_graph;

/// Input for [`StateStore::insert`].
#[derive(Debug, Clone)]
pub struct NewStateRow {
    pub entity_id: EntityId,
    pub schema_key: SchemaKey,
    /// Exact schema version; latest registered when absent.
    pub schema_version: Option<String>,
    pub file_id: FileId,
    pub plugin_key: Option<String>,
    pub snapshot_content: Value,
    /// Target version; the active version when absent.
    pub version_id: Option<VersionId>,
    /// Commit metadata, surfaced by the history view.
    pub metadata: Option<Value>,
}

impl NewStateRow {
    pub fn new(schema_key: SchemaKey, entity_id: EntityId, snapshot_content: Value) -> Self {
        Self {
            entity_id,
            schema_key,
            schema_version: None,
            file_id: FileId::unscoped(),
            plugin_key: None,
            snapshot_content,
            version_id: None,
            metadata: None,
        }
    }

    pub fn in_version(mut self, version_id: VersionId) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn in_file(mut self, file_id: FileId) -> Self {
        self.file_id = file_id;
        self
    }

    pub fn with_plugin_key(mut self, plugin_key: impl Into<String>) -> Self {
        self.plugin_key = Some(plugin_key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Row filters for select/update/delete. Absent components match anything;
/// an absent version targets the active version.
#[derive(Debug, Clone, Default)]
pub struct StateFilter {
    pub version_id: Option<VersionId>,
    pub schema_key: Option<SchemaKey>,
    pub entity_id: Option<EntityId>,
    pub file_id: Option<FileId>,
}

impl StateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_schema(schema_key: SchemaKey) -> Self {
        Self {
            schema_key: Some(schema_key),
            ..Self::default()
        }
    }

    pub fn with_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn in_version(mut self, version_id: VersionId) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn in_file(mut self, file_id: FileId) -> Self {
        self.file_id = Some(file_id);
        self
    }
}

/// A shallow merge applied to the current snapshot on update.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    set: Map<String, Value>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, property: impl Into<String>, value: Value) -> Self {
        self.set.insert(property.into(), value);
        self
    }

    /// Builds a patch from a JSON object.
    pub fn from_object(value: Value) -> Result<Self> {
        match value {
            Value::Object(set) => Ok(Self { set }),
            other => Err(LixError::invalid_operation(format!(
                "update patch must be a JSON object, got {other}"
            ))),
        }
    }

    fn apply(&self, snapshot: &Value) -> Value {
        let mut merged = snapshot
            .as_object()
            .cloned()
            .unwrap_or_default();
        for (key, value) in &self.set {
            merged.insert(key.clone(), value.clone());
        }
        Value::Object(merged)
    }
}

/// CRUD over versioned entity state.
pub struct StateStore {
    store: Arc<Store>,
    registry: Arc<SchemaRegistry>,
    cache_manager: Arc<StateCacheManager>,
    clock: Arc<MonotonicClock>,
}

impl StateStore {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<SchemaRegistry>,
        cache_manager: Arc<StateCacheManager>,
        clock: Arc<MonotonicClock>,
    ) -> Self {
        Self {
            store,
            registry,
            cache_manager,
            clock,
        }
    }

    /// Resolves the rows a filter matches, inheritance included. Result
    /// rows carry the requested version id; `inherited_from_version_id`
    /// names the owning ancestor where applicable.
    pub fn select(&self, filter: &StateFilter) -> Result<Vec<StateRow>> {
        self.cache_manager.ensure_fresh()?;
        self.store.with_conn(|conn| {
            let version_id = self.target_version(conn, filter.version_id.as_ref())?;
            let chain = version_graph::ancestry_in(conn, &version_id)?;
            let resolved = resolve::resolve_filtered(
                conn,
                &chain,
                filter.entity_id.as_ref(),
                filter.schema_key.as_ref(),
                filter.file_id.as_ref(),
            )?;
            Ok(resolved
                .into_iter()
                .filter_map(|row| row.into_state_row(&version_id))
                .collect())
        })
    }

    /// Validates and appends a new entity. Fails when a live row (own or
    /// inherited) already exists for the key.
    pub fn insert(&self, row: NewStateRow) -> Result<StateRow> {
        self.cache_manager.ensure_fresh()?;
        // schema resolution happens outside the transaction
        let def = match &row.schema_version {
            Some(version) => self.registry.resolve_at(&row.schema_key, version)?,
            None => self.registry.resolve(&row.schema_key)?,
        };
        validate_snapshot(&def, &row.snapshot_content)?;

        self.store.with_tx(|tx| {
            let version_id = self.target_version(tx, row.version_id.as_ref())?;
            let version = version_graph::get_in(tx, &version_id)?;
            let chain = version_graph::ancestry_in(tx, &version_id)?;

            let existing = resolve::resolve_key(
                tx,
                &chain,
                &row.entity_id,
                &row.schema_key,
                &row.file_id,
            )?;
            if matches!(&existing, Some(found) if !found.entry.is_tombstone()) {
                return Err(LixError::EntityAlreadyExists {
                    schema_key: row.schema_key.as_str().to_string(),
                    entity_id: row.entity_id.as_str().to_string(),
                    version_id: version_id.as_str().to_string(),
                });
            }

            let mut version = version_graph::ensure_owned_change_set(tx, &version)?;
            let now = self.clock.now_rfc3339();
            let change = Change {
                id: ChangeId::generate(),
                entity_id: row.entity_id,
                schema_key: row.schema_key,
                schema_version: def.version.clone(),
                file_id: row.file_id,
                plugin_key: row
                    .plugin_key
                    .unwrap_or_else(|| Defaults::PLUGIN_KEY.to_string()),
                snapshot_content: Some(row.snapshot_content),
                created_at: now.clone(),
            };
            record_change(tx, &mut version, &change, row.metadata.as_ref(), &now)?;

            let entry = CacheEntry {
                version_id: version.id.clone(),
                entity_id: change.entity_id.clone(),
                schema_key: change.schema_key.clone(),
                file_id: change.file_id.clone(),
                plugin_key: change.plugin_key.clone(),
                schema_version: change.schema_version.clone(),
                snapshot_content: change.snapshot_content.clone(),
                change_id: change.id.clone(),
                created_at: now.clone(),
                updated_at: now,
            };
            cache::upsert_entry(tx, &entry)?;

            let row = ResolvedRow {
                entry,
                owner: version.id.clone(),
                depth: 0,
            }
            .into_state_row(&version.id)
            .ok_or_else(|| LixError::invalid_operation("insert produced a tombstone"))?;
            Ok(row)
        })
    }

    /// Applies a shallow-merge patch to every row the filter matches.
    ///
    /// Own rows keep their `created_at`; inherited rows are copied on write
    /// into the target version with a fresh `created_at` and a cleared
    /// `inherited_from_version_id`. The merged snapshot is re-validated
    /// before anything commits.
    pub fn update(&self, filter: &StateFilter, patch: &StatePatch) -> Result<Vec<StateRow>> {
        self.cache_manager.ensure_fresh()?;
        self.store.with_tx(|tx| {
            let version_id = self.target_version(tx, filter.version_id.as_ref())?;
            let version = version_graph::get_in(tx, &version_id)?;
            let chain = version_graph::ancestry_in(tx, &version_id)?;
            let targets: Vec<ResolvedRow> = resolve::resolve_filtered(
                tx,
                &chain,
                filter.entity_id.as_ref(),
                filter.schema_key.as_ref(),
                filter.file_id.as_ref(),
            )?
            .into_iter()
            .filter(|row| !row.entry.is_tombstone())
            .collect();

            if targets.is_empty() {
                return Ok(Vec::new());
            }

            let mut version = version_graph::ensure_owned_change_set(tx, &version)?;
            let mut updated = Vec::with_capacity(targets.len());
            for target in targets {
                updated.push(self.update_one(tx, &mut version, target, patch)?);
            }
            Ok(updated)
        })
    }

    fn update_one(
        &self,
        conn: &Connection,
        version: &mut Version,
        target: ResolvedRow,
        patch: &StatePatch,
    ) -> Result<StateRow> {
        // registered rows always resolve from the warm cache
        let def = self
            .registry
            .resolve_at(&target.entry.schema_key, &target.entry.schema_version)?;
        let current = target
            .entry
            .snapshot_content
            .as_ref()
            .ok_or_else(|| LixError::invalid_operation("cannot update a deleted row"))?;
        let merged = patch.apply(current);
        validate_snapshot(&def, &merged)?;

        let now = self.clock.now_rfc3339();
        let change = Change {
            id: ChangeId::generate(),
            entity_id: target.entry.entity_id.clone(),
            schema_key: target.entry.schema_key.clone(),
            schema_version: target.entry.schema_version.clone(),
            file_id: target.entry.file_id.clone(),
            plugin_key: target.entry.plugin_key.clone(),
            snapshot_content: Some(merged),
            created_at: now.clone(),
        };
        record_change(conn, version, &change, None, &now)?;

        let owned = target.depth == 0;
        let entry = CacheEntry {
            version_id: version.id.clone(),
            entity_id: change.entity_id.clone(),
            schema_key: change.schema_key.clone(),
            file_id: change.file_id.clone(),
            plugin_key: change.plugin_key.clone(),
            schema_version: change.schema_version.clone(),
            snapshot_content: change.snapshot_content.clone(),
            change_id: change.id.clone(),
            // copy-on-write starts a fresh row: created "now", not at the
            // ancestor's timestamp
            created_at: if owned {
                target.entry.created_at.clone()
            } else {
                now.clone()
            },
            updated_at: now,
        };
        cache::upsert_entry(conn, &entry)?;

        ResolvedRow {
            entry,
            owner: version.id.clone(),
            depth: 0,
        }
        .into_state_row(&version.id)
        .ok_or_else(|| LixError::invalid_operation("update produced a tombstone"))
    }

    /// Deletes every live row the filter matches, after checking that no
    /// observing version still references the entities. Own rows leave the
    /// live projection (their history stays in the ledger); inherited rows
    /// get a version-local tombstone.
    pub fn delete(&self, filter: &StateFilter) -> Result<usize> {
        self.cache_manager.ensure_fresh()?;
        self.store.with_tx(|tx| {
            let version_id = self.target_version(tx, filter.version_id.as_ref())?;
            let version = version_graph::get_in(tx, &version_id)?;
            let chain = version_graph::ancestry_in(tx, &version_id)?;
            let targets: Vec<ResolvedRow> = resolve::resolve_filtered(
                tx,
                &chain,
                filter.entity_id.as_ref(),
                filter.schema_key.as_ref(),
                filter.file_id.as_ref(),
            )?
            .into_iter()
            .filter(|row| !row.entry.is_tombstone())
            .collect();

            if targets.is_empty() {
                return Ok(0);
            }

            for target in &targets {
                fk::check_delete_allowed(tx, &self.registry, &version_id, target)?;
            }

            let mut version = version_graph::ensure_owned_change_set(tx, &version)?;
            let deleted = targets.len();
            for target in targets {
                let now = self.clock.now_rfc3339();
                let change = Change {
                    id: ChangeId::generate(),
                    entity_id: target.entry.entity_id.clone(),
                    schema_key: target.entry.schema_key.clone(),
                    schema_version: target.entry.schema_version.clone(),
                    file_id: target.entry.file_id.clone(),
                    plugin_key: target.entry.plugin_key.clone(),
                    snapshot_content: None,
                    created_at: now.clone(),
                };
                record_change(tx, &mut version, &change, None, &now)?;

                let owned = target.depth == 0;
                let entry = CacheEntry {
                    version_id: version.id.clone(),
                    entity_id: change.entity_id.clone(),
                    schema_key: change.schema_key.clone(),
                    file_id: change.file_id.clone(),
                    plugin_key: change.plugin_key.clone(),
                    schema_version: change.schema_version.clone(),
                    snapshot_content: None,
                    change_id: change.id.clone(),
                    created_at: if owned {
                        target.entry.created_at.clone()
                    } else {
                        now.clone()
                    },
                    updated_at: now,
                };
                cache::upsert_entry(tx, &entry)?;
            }
            Ok(deleted)
        })
    }

    fn target_version(
        &self,
        conn: &Connection,
        requested: Option<&VersionId>,
    ) -> Result<VersionId> {
        match requested {
            Some(id) => Ok(id.clone()),
            None => Ok(versions::get_active_version(conn)?),
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

/// Appends the ledger records of one mutation: the change itself, its
/// change-set element, and a commit chained from the version's tip. The
/// tip advances in place so consecutive changes in one transaction form a
/// linear chain.
fn record_change(
    conn: &Connection,
    version: &mut Version,
    change: &Change,
    metadata: Option<&Value>,
    now: &str,
) -> Result<CommitId> {
    change_log::append_change(conn, change)?;
    change_log::append_element(conn, &version.change_set_id, change)?;
    let commit_id = CommitId::generate();
    change_log::append_commit(
        conn,
        &commit_id,
        &version.change_set_id,
        version.tip_commit_id.as_ref(),
        &change.id,
        metadata,
        now,
    )?;
    versions::update_version_tip(conn, &version.id, &commit_id)?;
    version.tip_commit_id = Some(commit_id.clone());
    Ok(commit_id)
}
