//! SQLite persistence layer for LixDB.
//!
//! This crate owns the backing storage file: the append-only change ledger,
//! change sets and their element journal, the version records, the commit
//! chains, the write-through state cache, stored schema definitions, and the
//! active-version indicator. It also creates the two derived relations the
//! SQL rewriter targets (`state_by_version`, `state_history`).
//!
//! The crate is deliberately mechanical: it maps rows in and out of SQLite
//! and groups statements into transactions. All semantics (inheritance,
//! copy-on-write, validation, foreign keys) live in `lixdb-core`.

pub mod bootstrap;
pub mod cache;
pub mod change_log;
pub mod connection;
pub mod error;
pub mod exec;
pub mod schemas;
pub mod versions;

pub use connection::Store;
pub use error::StoreError;

/// Store-level result alias.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
