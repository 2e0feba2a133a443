//! SQLite implementation of the wallet store.
//!
//! One row per tenant, keyed by tenant id. `insert_or_get` is the
//! idempotence primitive behind provisioning: `INSERT … ON CONFLICT DO
//! NOTHING` followed by a read-back under the same connection lock, so
//! two racing provisioners always converge on the first stored wallet.
//! Fallback key material is written for operator recovery but never read
//! back by the gateway.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tollgate::error::StoreError;
use tollgate::timestamp::UnixTimestamp;
use tollgate::wallet::{Wallet, WalletRecord, WalletStore};

use crate::{lock, map_sqlite_err};

/// Wallet records over the shared SQLite connection.
#[derive(Debug, Clone)]
pub struct SqliteWalletStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWalletStore {
    /// Creates the wallet store over a shared connection.
    #[must_use]
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn find_in(conn: &Connection, tenant_id: &str) -> Result<Option<Wallet>, StoreError> {
        let row = conn
            .query_row(
                "SELECT address, provenance, network FROM wallets WHERE tenant_id = ?1",
                [tenant_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(map_sqlite_err)?;

        match row {
            None => Ok(None),
            Some((address, provenance, network)) => {
                let provenance = provenance.parse().map_err(|e| {
                    StoreError::Corrupt(format!("wallet for {tenant_id}: {e}"))
                })?;
                Ok(Some(Wallet {
                    address,
                    provenance,
                    network,
                }))
            }
        }
    }

    fn insert_or_get_in(
        conn: &Connection,
        tenant_id: &str,
        record: &WalletRecord,
    ) -> Result<Wallet, StoreError> {
        conn.execute(
            "INSERT INTO wallets (tenant_id, address, provenance, network, fallback_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tenant_id) DO NOTHING",
            params![
                tenant_id,
                record.wallet.address,
                record.wallet.provenance.as_str(),
                record.wallet.network,
                record.fallback_key,
                UnixTimestamp::now().as_secs(),
            ],
        )
        .map_err(map_sqlite_err)?;

        Self::find_in(conn, tenant_id)?.ok_or_else(|| {
            StoreError::Backend(format!("wallet row for {tenant_id} vanished after insert"))
        })
    }
}

#[async_trait]
impl WalletStore for SqliteWalletStore {
    async fn find(&self, tenant_id: &str) -> Result<Option<Wallet>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let tenant_id = tenant_id.to_owned();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            Self::find_in(&guard, &tenant_id)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }

    async fn insert_or_get(
        &self,
        tenant_id: &str,
        record: &WalletRecord,
    ) -> Result<Wallet, StoreError> {
        let conn = Arc::clone(&self.conn);
        let tenant_id = tenant_id.to_owned();
        let record = record.clone();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            Self::insert_or_get_in(&guard, &tenant_id, &record)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }
}
