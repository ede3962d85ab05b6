//! The version inheritance forest and change-set ownership.
//!
//! Versions are plain records with parent *ids*, not live references: chain
//! walks load rows by id, and inheritance edges are set once at creation,
//! so the graph is cycle-free by construction.

use std::sync::Arc;

use rusqlite::Connection;

use lixdb_commons::{CacheEntry, ChangeSetId, Version, VersionId};
use lixdb_store::{cache, versions, Store};

use crate::error::{LixError, Result};

/// How a new version comes into being.
#[derive(Debug, Clone, Default)]
pub struct CreateVersionSpec {
    pub name: String,
    /// Explicit id; generated when absent.
    pub id: Option<VersionId>,
    /// Parent to inherit unmodified entities from.
    pub inherits_from: Option<VersionId>,
    /// Share another version's change set instead of starting empty. Both
    /// versions observe byte-identical state until one of them writes.
    pub share_change_set_with: Option<VersionId>,
}

impl CreateVersionSpec {
    /// A version inheriting from `global`, the common case.
    pub fn inheriting(name: impl Into<String>, parent: VersionId) -> Self {
        Self {
            name: name.into(),
            id: None,
            inherits_from: Some(parent),
            share_change_set_with: None,
        }
    }

    /// A version sharing the source's change set (no inheritance edge).
    pub fn sharing(name: impl Into<String>, source: VersionId) -> Self {
        Self {
            name: name.into(),
            id: None,
            inherits_from: None,
            share_change_set_with: Some(source),
        }
    }
}

/// Accessor over the version records.
#[derive(Debug)]
pub struct VersionGraph {
    store: Arc<Store>,
}

impl VersionGraph {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Creates a version.
    ///
    /// Sharing a change set copies the source's owned cache entries to the
    /// new version (they are owned rows there, not inherited ones) and
    /// continues the source's commit lineage.
    pub fn create(&self, spec: CreateVersionSpec) -> Result<Version> {
        self.store.with_tx(|tx| self.create_in(tx, spec))
    }

    pub(crate) fn create_in(
        &self,
        conn: &Connection,
        spec: CreateVersionSpec,
    ) -> Result<Version> {
        if let Some(parent) = &spec.inherits_from {
            if versions::get_version(conn, parent)?.is_none() {
                return Err(LixError::version_not_found(parent.as_str()));
            }
        }

        let id = spec.id.unwrap_or_else(VersionId::generate);
        let (change_set_id, tip_commit_id) = match &spec.share_change_set_with {
            Some(source_id) => {
                let source = versions::get_version(conn, source_id)?
                    .ok_or_else(|| LixError::version_not_found(source_id.as_str()))?;
                (source.change_set_id, source.tip_commit_id)
            }
            None => {
                let set = ChangeSetId::generate();
                versions::insert_change_set(conn, &set, None, None)?;
                (set, None)
            }
        };

        let version = Version {
            id,
            name: spec.name,
            change_set_id,
            inherits_from_version_id: spec.inherits_from,
            tip_commit_id,
        };
        versions::insert_version(conn, &version)?;

        if let Some(source_id) = &spec.share_change_set_with {
            // byte-identical state: mirror the source's owned rows
            for entry in cache::entries_filtered(conn, source_id, None, None, None)? {
                let copied = CacheEntry {
                    version_id: version.id.clone(),
                    ..entry
                };
                cache::upsert_entry(conn, &copied)?;
            }
        }

        log::info!("created version '{}' ({})", version.name, version.id);
        Ok(version)
    }

    pub fn get(&self, id: &VersionId) -> Result<Version> {
        self.store.with_conn(|conn| get_in(conn, id))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Version> {
        self.store.with_conn(|conn| {
            versions::get_version_by_name(conn, name)?
                .ok_or_else(|| LixError::version_not_found(name))
        })
    }

    pub fn list(&self) -> Result<Vec<Version>> {
        self.store
            .with_conn(|conn| versions::list_versions(conn).map_err(LixError::from))
    }

    /// Inheritance chain starting at the version itself.
    pub fn ancestry(&self, id: &VersionId) -> Result<Vec<VersionId>> {
        self.store.with_conn(|conn| ancestry_in(conn, id))
    }
}

/// Loads a version inside an open transaction.
pub(crate) fn get_in(conn: &Connection, id: &VersionId) -> Result<Version> {
    versions::get_version(conn, id)?
        .ok_or_else(|| LixError::version_not_found(id.as_str()))
}

/// Walks parent ids from a version to its root, inclusive.
pub(crate) fn ancestry_in(conn: &Connection, id: &VersionId) -> Result<Vec<VersionId>> {
    let mut chain = Vec::new();
    let mut cursor = Some(id.clone());
    while let Some(current) = cursor {
        if chain.contains(&current) {
            // edges are append-only and set once, so this is unreachable;
            // bail out instead of spinning if the table was tampered with
            return Err(LixError::invalid_operation(format!(
                "inheritance cycle detected at version '{current}'"
            )));
        }
        let version = get_in(conn, &current)?;
        chain.push(current);
        cursor = version.inherits_from_version_id;
    }
    Ok(chain)
}

/// Transitive children (versions that inherit from `id`, directly or not).
pub(crate) fn descendants_in(conn: &Connection, id: &VersionId) -> Result<Vec<VersionId>> {
    let mut result = Vec::new();
    let mut frontier = vec![id.clone()];
    while let Some(current) = frontier.pop() {
        for child in versions::child_versions(conn, &current)? {
            frontier.push(child.id.clone());
            result.push(child.id);
        }
    }
    Ok(result)
}

/// Gives a version exclusive ownership of its change set before a write.
///
/// When any other version points at the same set, a fork is created: a new
/// set whose parent is the shared one, with the cutoff pinned at the shared
/// set's current element sequence so post-divergence writes by the other
/// sharer never leak through the chain.
pub(crate) fn ensure_owned_change_set(
    conn: &Connection,
    version: &Version,
) -> Result<Version> {
    let sharers = versions::sharing_version_count(conn, &version.change_set_id, &version.id)?;
    if sharers == 0 {
        return Ok(version.clone());
    }

    let cutoff = versions::max_element_seq(conn, &version.change_set_id)?;
    let fork = ChangeSetId::generate();
    versions::insert_change_set(conn, &fork, Some(&version.change_set_id), Some(cutoff))?;
    versions::update_version_change_set(conn, &version.id, &fork)?;
    log::debug!(
        "forked change set {} from {} for version {}",
        fork,
        version.change_set_id,
        version.id
    );

    let mut owned = version.clone();
    owned.change_set_id = fork;
    Ok(owned)
}
