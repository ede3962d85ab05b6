//! LixDB core: the change-controlled, multi-version state engine.
//!
//! This crate ties the storage layer and the SQL preprocessing passes into
//! the embedded engine:
//!
//! - [`schema_registry`]: schema registration, resolution, and snapshot
//!   validation
//! - [`version_graph`]: version creation, inheritance ancestry, and
//!   fork-on-write of shared change sets
//! - [`state`]: the state store (select/insert/update/delete with
//!   inheritance and copy-on-write), write-through cache maintenance, and
//!   full rebuild from the change ledger
//! - [`engine`]: the public facade, SQL execution with entity-view
//!   rewriting and DML routing
//!
//! Everything is synchronous and single-writer; one mutation's ledger
//! append, cache write-through, and constraint checks share a SQLite
//! transaction.

pub mod dml;
pub mod engine;
pub mod error;
pub mod schema_registry;
pub mod state;
pub mod version_graph;

pub use engine::{Engine, ExecutionResult};
pub use error::{LixError, Result};
pub use schema_registry::SchemaRegistry;
pub use state::{NewStateRow, StateFilter, StatePatch, StateStore};
pub use version_graph::{CreateVersionSpec, VersionGraph};

// Re-export the common model types for convenience
pub use lixdb_commons::{
    CacheEntry, Change, ChangeId, ChangeSetId, CommitId, EntityId, FileId, ForeignKey,
    ForeignKeyRef, PropertyType, SchemaDefinition, SchemaKey, StateRow, Version, VersionId,
    ViewVariants,
};
