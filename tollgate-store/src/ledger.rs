//! SQLite implementation of the decision ledger.
//!
//! Appends are plain inserts; the grant path goes through
//! `claim_and_append`, which claims the payment proof in `spent_proofs`
//! and writes the ledger entry inside one transaction. The UNIQUE
//! constraint on `spent_proofs.tx_ref` is what makes the claim atomic:
//! when two grants race on the same proof, exactly one transaction
//! commits and the other rolls back into [`ClaimOutcome::AlreadySpent`].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;
use tollgate::error::StoreError;
use tollgate::ledger::{
    ClaimOutcome, Ledger, LedgerEntry, LedgerPage, LedgerQuery, NewLedgerEntry,
};
use tollgate::timestamp::UnixTimestamp;

use crate::{is_unique_violation, lock, map_sqlite_err};

/// Ledger over the shared SQLite connection.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

/// A ledger row before enum/decimal/json decoding.
struct RawEntry {
    id: i64,
    correlation_id: String,
    actor_id: String,
    action_kind: String,
    amount: String,
    details: String,
    timestamp: u64,
}

impl RawEntry {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            correlation_id: row.get(1)?,
            actor_id: row.get(2)?,
            action_kind: row.get(3)?,
            amount: row.get(4)?,
            details: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }
}

impl TryFrom<RawEntry> for LedgerEntry {
    type Error = StoreError;

    fn try_from(raw: RawEntry) -> Result<Self, StoreError> {
        let action_kind = raw
            .action_kind
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("ledger row {}: {e}", raw.id)))?;
        let amount: Decimal = raw
            .amount
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("ledger row {}: bad amount: {e}", raw.id)))?;
        let details = serde_json::from_str(&raw.details)
            .map_err(|e| StoreError::Corrupt(format!("ledger row {}: bad details: {e}", raw.id)))?;
        Ok(Self {
            id: raw.id,
            correlation_id: raw.correlation_id,
            actor_id: raw.actor_id,
            action_kind,
            amount,
            details,
            timestamp: UnixTimestamp::from_secs(raw.timestamp),
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, correlation_id, actor_id, action_kind, amount, details, timestamp";

impl SqliteLedger {
    /// Creates the ledger over a shared connection.
    #[must_use]
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn append_in(conn: &Connection, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        conn.execute(
            "INSERT INTO ledger_entries
             (correlation_id, actor_id, action_kind, amount, details, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.correlation_id,
                entry.actor_id,
                entry.action_kind.as_str(),
                entry.amount.to_string(),
                entry.details.to_string(),
                entry.timestamp.as_secs(),
            ],
        )
        .map_err(map_sqlite_err)?;

        Ok(LedgerEntry {
            id: conn.last_insert_rowid(),
            correlation_id: entry.correlation_id,
            actor_id: entry.actor_id,
            action_kind: entry.action_kind,
            amount: entry.amount,
            details: entry.details,
            timestamp: entry.timestamp,
        })
    }

    fn claim_and_append_in(
        conn: &mut Connection,
        tx_ref: &str,
        entry: NewLedgerEntry,
    ) -> Result<ClaimOutcome, StoreError> {
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let entry = Self::append_in(&tx, entry)?;
        match tx.execute(
            "INSERT INTO spent_proofs (tx_ref, ledger_entry_id, claimed_at) VALUES (?1, ?2, ?3)",
            params![tx_ref, entry.id, entry.timestamp.as_secs()],
        ) {
            Ok(_) => {}
            // Dropping the transaction rolls the entry insert back too.
            Err(e) if is_unique_violation(&e) => return Ok(ClaimOutcome::AlreadySpent),
            Err(e) => return Err(map_sqlite_err(e)),
        }
        tx.commit().map_err(map_sqlite_err)?;
        Ok(ClaimOutcome::Claimed(entry))
    }

    fn query_in(conn: &Connection, query: &LedgerQuery) -> Result<LedgerPage, StoreError> {
        let limit = query.effective_limit() as usize;

        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM ledger_entries WHERE 1=1");
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(kind) = query.kind {
            sql.push_str(&format!(" AND action_kind = ?{}", bound.len() + 1));
            bound.push(Box::new(kind.as_str()));
        }
        if let Some(before) = query.before {
            sql.push_str(&format!(" AND id < ?{}", bound.len() + 1));
            bound.push(Box::new(before));
        }
        // Fetch one row past the page to learn whether a next page exists.
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", limit + 1));

        let mut stmt = conn.prepare(&sql).map_err(map_sqlite_err)?;
        let bound_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(bound_refs.as_slice(), RawEntry::read)
            .map_err(map_sqlite_err)?;

        let mut entries = Vec::new();
        for raw in rows {
            entries.push(LedgerEntry::try_from(raw.map_err(map_sqlite_err)?)?);
        }

        let next_before = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|entry| entry.id)
        } else {
            None
        };

        Ok(LedgerPage {
            entries,
            next_before,
        })
    }

    fn find_by_correlation_in(
        conn: &Connection,
        correlation_id: &str,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM ledger_entries
                 WHERE correlation_id = ?1 ORDER BY id ASC"
            ))
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map([correlation_id], RawEntry::read)
            .map_err(map_sqlite_err)?;

        let mut entries = Vec::new();
        for raw in rows {
            entries.push(LedgerEntry::try_from(raw.map_err(map_sqlite_err)?)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            Self::append_in(&guard, entry)
        })
        .await
        .map_err(join_err)?
    }

    async fn claim_and_append(
        &self,
        tx_ref: &str,
        entry: NewLedgerEntry,
    ) -> Result<ClaimOutcome, StoreError> {
        let conn = Arc::clone(&self.conn);
        let tx_ref = tx_ref.to_owned();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            Self::claim_and_append_in(&mut guard, &tx_ref, entry)
        })
        .await
        .map_err(join_err)?
    }

    async fn query(&self, query: LedgerQuery) -> Result<LedgerPage, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            Self::query_in(&guard, &query)
        })
        .await
        .map_err(join_err)?
    }

    async fn find_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let correlation_id = correlation_id.to_owned();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            Self::find_by_correlation_in(&guard, &correlation_id)
        })
        .await
        .map_err(join_err)?
    }
}

fn join_err(err: tokio::task::JoinError) -> StoreError {
    StoreError::Backend(format!("store task failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GatewayStore;
    use tollgate::ledger::ActionKind;

    fn entry(correlation: &str, kind: ActionKind) -> NewLedgerEntry {
        NewLedgerEntry::new(correlation, "GPTBot/1.2", kind)
    }

    fn spent_ref(fill: char) -> String {
        format!("0x{}", fill.to_string().repeat(64))
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids_and_round_trips() {
        let ledger = GatewayStore::open_in_memory().unwrap().ledger();

        let first = ledger
            .append(
                entry("corr-1", ActionKind::PaymentAccepted)
                    .with_amount("0.002".parse().unwrap())
                    .with_details(serde_json::json!({"payer": "0xabc"})),
            )
            .await
            .unwrap();
        let second = ledger
            .append(entry("corr-1", ActionKind::AllowedVisit))
            .await
            .unwrap();
        assert!(second.id > first.id);

        let found = ledger.find_by_correlation("corr-1").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], first);
        assert_eq!(found[0].amount.to_string(), "0.002");
        assert_eq!(found[0].details["payer"], "0xabc");
    }

    #[tokio::test]
    async fn query_filters_by_kind_newest_first() {
        let ledger = GatewayStore::open_in_memory().unwrap().ledger();
        for kind in [
            ActionKind::AllowedVisit,
            ActionKind::PaymentAccepted,
            ActionKind::AllowedVisit,
        ] {
            ledger.append(entry("corr", kind)).await.unwrap();
        }

        let page = ledger
            .query(LedgerQuery {
                kind: Some(ActionKind::AllowedVisit),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(page.entries.len(), 2);
        assert!(page.entries[0].id > page.entries[1].id, "newest first");
        assert!(
            page.entries
                .iter()
                .all(|e| e.action_kind == ActionKind::AllowedVisit)
        );
        assert_eq!(page.next_before, None);
    }

    #[tokio::test]
    async fn query_paginates_with_before_cursor() {
        let ledger = GatewayStore::open_in_memory().unwrap().ledger();
        for i in 0..5 {
            ledger
                .append(entry(&format!("corr-{i}"), ActionKind::BlockedPendingPayment))
                .await
                .unwrap();
        }

        let first = ledger
            .query(LedgerQuery {
                limit: Some(2),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(first.entries.len(), 2);
        let cursor = first.next_before.unwrap();
        assert_eq!(cursor, first.entries[1].id);

        let second = ledger
            .query(LedgerQuery {
                limit: Some(2),
                before: Some(cursor),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 2);
        assert!(second.entries[0].id < cursor);

        let last = ledger
            .query(LedgerQuery {
                limit: Some(2),
                before: second.next_before,
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.next_before, None);
    }

    #[tokio::test]
    async fn claim_accepts_once_and_rejects_replay() {
        let ledger = GatewayStore::open_in_memory().unwrap().ledger();
        let proof = spent_ref('a');

        let first = ledger
            .claim_and_append(&proof, entry("corr-1", ActionKind::PaymentAccepted))
            .await
            .unwrap();
        assert!(matches!(first, ClaimOutcome::Claimed(_)));

        let replay = ledger
            .claim_and_append(&proof, entry("corr-2", ActionKind::PaymentAccepted))
            .await
            .unwrap();
        assert_eq!(replay, ClaimOutcome::AlreadySpent);

        // The replayed attempt must not leave a ledger entry behind.
        assert!(ledger.find_by_correlation("corr-2").await.unwrap().is_empty());

        let other = ledger
            .claim_and_append(&spent_ref('b'), entry("corr-3", ActionKind::PaymentAccepted))
            .await
            .unwrap();
        assert!(matches!(other, ClaimOutcome::Claimed(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_claims_grant_exactly_once() {
        let ledger = Arc::new(GatewayStore::open_in_memory().unwrap().ledger());
        let proof = spent_ref('c');

        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = Arc::clone(&ledger);
            let proof = proof.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .claim_and_append(&proof, entry(&format!("corr-{i}"), ActionKind::PaymentAccepted))
                    .await
            }));
        }

        let mut claimed = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ClaimOutcome::Claimed(_) => claimed += 1,
                ClaimOutcome::AlreadySpent => {}
            }
        }
        assert_eq!(claimed, 1, "exactly one racer may claim the proof");
    }
}
