//! Shared building blocks for the LixDB engine.
//!
//! This crate holds everything the other LixDB crates agree on:
//! - Type-safe identifier newtypes (`VersionId`, `ChangeId`, `SchemaKey`, ...)
//! - Domain models (`Change`, `Version`, `SchemaDefinition`, `StateRow`, ...)
//! - Metadata column names and engine defaults (`LixCol`, `Defaults`)
//! - The monotonic timestamp clock used for `created_at`/`updated_at`
//!
//! It performs no I/O and has no knowledge of SQLite or the SQL layer.

pub mod clock;
pub mod constants;
pub mod models;

pub use clock::MonotonicClock;
pub use constants::{Defaults, LixCol, Relations};
pub use models::ids::{
    ChangeId, ChangeSetId, CommitId, EntityId, FileId, SchemaKey, VersionId,
};
pub use models::{
    CacheEntry, Change, ForeignKey, ForeignKeyRef, PropertyType, SchemaDefinition, StateRow,
    Version, ViewVariants,
};
