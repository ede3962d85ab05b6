//! Foreign-key enforcement on delete.
//!
//! A delete is blocked while any live row still references the entity, in
//! any version that can observe the delete: the writing version itself and
//! every descendant whose resolution currently lands on the same underlying
//! row (a descendant that already shadows the entity with its own copy is
//! unaffected by the delete and does not participate).

use rusqlite::Connection;

use lixdb_commons::VersionId;

use crate::error::{LixError, Result};
use crate::schema_registry::SchemaRegistry;
use crate::state::resolve::{self, ResolvedRow};
use crate::version_graph;

pub(crate) fn check_delete_allowed(
    conn: &Connection,
    registry: &SchemaRegistry,
    deleting_version: &VersionId,
    target: &ResolvedRow,
) -> Result<()> {
    let referencing = registry.foreign_keys_referencing(&target.entry.schema_key);
    if referencing.is_empty() {
        return Ok(());
    }

    let mut observers = vec![deleting_version.clone()];
    for candidate in version_graph::descendants_in(conn, deleting_version)? {
        let chain = version_graph::ancestry_in(conn, &candidate)?;
        let resolved = resolve::resolve_key(
            conn,
            &chain,
            &target.entry.entity_id,
            &target.entry.schema_key,
            &target.entry.file_id,
        )?;
        if let Some(resolved) = resolved {
            if resolved.entry.change_id == target.entry.change_id
                && !resolved.entry.is_tombstone()
            {
                observers.push(candidate);
            }
        }
    }

    for version in &observers {
        let chain = version_graph::ancestry_in(conn, version)?;
        for (ref_def, fk) in &referencing {
            let Some(referenced_value) = target
                .entry
                .snapshot_content
                .as_ref()
                .and_then(|snapshot| snapshot.get(&fk.references.property))
            else {
                continue;
            };

            let rows = resolve::resolve_filtered(conn, &chain, None, Some(&ref_def.key), None)?;
            for row in rows {
                if row.entry.is_tombstone() {
                    continue;
                }
                let is_target_itself = row.entry.schema_key == target.entry.schema_key
                    && row.entry.entity_id == target.entry.entity_id
                    && row.entry.file_id == target.entry.file_id;
                if is_target_itself {
                    continue;
                }
                let references_target = row
                    .entry
                    .snapshot_content
                    .as_ref()
                    .and_then(|snapshot| snapshot.get(&fk.property))
                    == Some(referenced_value);
                if references_target {
                    return Err(LixError::ForeignKeyViolation {
                        schema_key: target.entry.schema_key.as_str().to_string(),
                        entity_id: target.entry.entity_id.as_str().to_string(),
                        referencing_schema: ref_def.key.as_str().to_string(),
                        referencing_property: fk.property.clone(),
                        version_id: version.as_str().to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}
