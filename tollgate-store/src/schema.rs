//! SQL schema initialization.

use rusqlite::Connection;
use tollgate::error::StoreError;

use crate::map_sqlite_err;

/// Schema version for migration tracking.
pub const SCHEMA_VERSION: u32 = 1;

/// Initializes the database schema.
///
/// Idempotent: tables and indexes are created only if missing, and an
/// already-current database is left untouched.
///
/// # Errors
///
/// [`StoreError::Backend`] on any SQLite failure, and
/// [`StoreError::Corrupt`] when the database carries a schema version
/// newer than this binary understands.
pub fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    // WAL lets ledger reads proceed while a decision is being appended.
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .map_err(map_sqlite_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )
    .map_err(map_sqlite_err)?;

    let current_version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    match current_version {
        None => {
            create_tables(conn)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map_err(map_sqlite_err)?;
        }
        Some(version) if version > SCHEMA_VERSION => {
            return Err(StoreError::Corrupt(format!(
                "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        Some(_) => {}
    }

    Ok(())
}

/// Creates all tables and indexes.
fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            correlation_id TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            action_kind TEXT NOT NULL,
            amount TEXT NOT NULL,
            details TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )",
        [],
    )
    .map_err(map_sqlite_err)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_kind ON ledger_entries(action_kind)",
        [],
    )
    .map_err(map_sqlite_err)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_correlation
         ON ledger_entries(correlation_id)",
        [],
    )
    .map_err(map_sqlite_err)?;

    // The UNIQUE primary key is the replay-protection authority: the first
    // grant inserts the proof here, every later attempt collides.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS spent_proofs (
            tx_ref TEXT PRIMARY KEY,
            ledger_entry_id INTEGER NOT NULL,
            claimed_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(map_sqlite_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS wallets (
            tenant_id TEXT PRIMARY KEY,
            address TEXT NOT NULL,
            provenance TEXT NOT NULL,
            network TEXT NOT NULL,
            fallback_key TEXT,
            created_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(map_sqlite_err)?;

    Ok(())
}
