//! SQLite persistence for the tollgate gateway.
//!
//! One database file holds three tables: the append-only decision ledger,
//! the spent-proof set that backs replay protection, and the per-tenant
//! wallet records. A single [`rusqlite::Connection`] is shared behind a
//! mutex; the async trait implementations hop onto the blocking pool for
//! every statement so the request path never blocks an executor thread.
//!
//! [`GatewayStore`] is the entry point: it opens the database, runs schema
//! initialization, and hands out the [`SqliteLedger`] and
//! [`SqliteWalletStore`] components over the shared connection.
//! [`RetryingLedger`] layers the write-retry queue on top.

pub mod ledger;
pub mod schema;
pub mod wallets;
pub mod writer;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tollgate::error::StoreError;

pub use ledger::SqliteLedger;
pub use wallets::SqliteWalletStore;
pub use writer::{ClaimDecision, DurableOutcome, RetryingLedger};

/// Open handle on the gateway database.
#[derive(Debug)]
pub struct GatewayStore {
    conn: Arc<Mutex<Connection>>,
}

impl GatewayStore {
    /// Opens (creating if needed) the database at `path` and initializes
    /// the schema.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] when the file cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        schema::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] when SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        schema::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// The decision ledger over this database.
    #[must_use]
    pub fn ledger(&self) -> SqliteLedger {
        SqliteLedger::new(Arc::clone(&self.conn))
    }

    /// The wallet store over this database.
    #[must_use]
    pub fn wallets(&self) -> SqliteWalletStore {
        SqliteWalletStore::new(Arc::clone(&self.conn))
    }
}

/// Flattens a rusqlite failure into the backend-agnostic [`StoreError`].
pub(crate) fn map_sqlite_err(err: rusqlite::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

/// Whether `err` is a uniqueness/primary-key constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Locks the shared connection, flattening poison into a store error.
pub(crate) fn lock(
    conn: &Arc<Mutex<Connection>>,
) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Backend("store connection lock poisoned".to_owned()))
}
