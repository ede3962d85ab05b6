//! Connection handling.
//!
//! One logical SQLite connection per store, behind a mutex. The engine is
//! single-writer by design; callers serialize through [`Store::with_conn`]
//! and [`Store::with_tx`].

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};

use crate::bootstrap;
use crate::error::StoreError;

/// Handle to the backing SQLite database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) a store at the given path and runs the
    /// bootstrap DDL.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store. State lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        bootstrap::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a read-style closure against the connection.
    pub fn with_conn<T, E>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Runs a closure inside a transaction.
    ///
    /// The transaction commits only when the closure succeeds; any error
    /// rolls back every statement issued inside it, so a mutation's ledger
    /// append, cache write-through, and constraint checks are atomic.
    pub fn with_tx<T, E>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(StoreError::from)
            .map_err(E::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from).map_err(E::from)?;
        Ok(out)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
