//! Cache lifecycle: staleness tracking and full rebuild from the ledger.
//!
//! The write-through cache is derived data. After `clear()` (or a schema
//! registration) the projection is stale; the next access reconstructs
//! every owned row purely from the change ledger, the change-set chains,
//! and the version graph, then serves reads as before. Hit and rebuilt
//! paths are observably identical.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::Connection;

use lixdb_commons::{CacheEntry, ChangeId, EntityId, FileId, SchemaKey, VersionId};
use lixdb_store::change_log::{self, ElementRecord};
use lixdb_store::{cache, Store};

use crate::error::{LixError, Result};

/// Owns the staleness flag and the rebuild path.
#[derive(Debug)]
pub struct StateCacheManager {
    store: Arc<Store>,
    stale: AtomicBool,
}

impl StateCacheManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            // a freshly opened store is consistent: cache and ledger were
            // last written in the same transaction
            stale: AtomicBool::new(false),
        }
    }

    /// Marks the projection stale without touching stored entries.
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    /// Drops every cache entry; the next access rebuilds from the ledger.
    pub fn clear(&self) -> Result<()> {
        self.store
            .with_tx(|tx| cache::clear(tx).map_err(LixError::from))?;
        self.stale.store(true, Ordering::SeqCst);
        log::info!("state cache cleared");
        Ok(())
    }

    /// Rebuilds the projection when stale. Called on every read and
    /// mutation entry point.
    pub fn ensure_fresh(&self) -> Result<()> {
        if !self.stale.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.store.with_tx(|tx| rebuild(tx))?;
        self.stale.store(false, Ordering::SeqCst);
        log::info!("state cache rebuilt from the change ledger");
        Ok(())
    }
}

/// Reconstructs every owned cache entry from ground truth.
///
/// `visible_elements` yields, per version, the element journal visible
/// through its change-set chain in sequence order; the last element of each
/// (version, entity key) group is the live one. `created_at` is the
/// earliest change of the contiguous run since the previous tombstone (a
/// trailing tombstone belongs to the run it terminates), which reproduces
/// the write-through timestamps exactly.
pub(crate) fn rebuild(conn: &Connection) -> Result<()> {
    cache::clear(conn)?;
    let records = change_log::visible_elements(conn)?;

    let mut index = 0;
    let mut rebuilt = 0usize;
    while index < records.len() {
        let start = index;
        while index < records.len() && same_group(&records[start], &records[index]) {
            index += 1;
        }
        let group = &records[start..index];
        write_group_entry(conn, group)?;
        rebuilt += 1;
    }

    log::debug!("rebuilt {rebuilt} cache entr(ies)");
    Ok(())
}

fn same_group(a: &ElementRecord, b: &ElementRecord) -> bool {
    a.version_id == b.version_id
        && a.entity_id == b.entity_id
        && a.schema_key == b.schema_key
        && a.file_id == b.file_id
}

fn write_group_entry(conn: &Connection, group: &[ElementRecord]) -> Result<()> {
    let Some(live) = group.last() else {
        return Ok(());
    };

    let mut run_start = 0;
    for (i, record) in group.iter().enumerate() {
        if record.snapshot_content.is_none() && i + 1 < group.len() {
            run_start = i + 1;
        }
    }

    let snapshot_content = live
        .snapshot_content
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?;

    let entry = CacheEntry {
        version_id: VersionId::new(live.version_id.clone()),
        entity_id: EntityId::new(live.entity_id.clone()),
        schema_key: SchemaKey::new(live.schema_key.clone()),
        file_id: FileId::new(live.file_id.clone()),
        plugin_key: live.plugin_key.clone(),
        schema_version: live.schema_version.clone(),
        snapshot_content,
        change_id: ChangeId::new(live.change_id.clone()),
        created_at: group[run_start].change_created_at.clone(),
        updated_at: live.change_created_at.clone(),
    };
    cache::upsert_entry(conn, &entry)?;
    Ok(())
}
