//! The append-only decision ledger.
//!
//! Every terminal gate decision becomes exactly one immutable
//! [`LedgerEntry`]. The trait is the seam: `tollgate-store` implements it
//! on SQLite, tests implement it in memory. Distinct from the *external*
//! ledger (the blockchain) the verifier consults.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::timestamp::UnixTimestamp;

/// Default page size for ledger queries.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Hard cap on ledger query page size.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Kinds of access decisions recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Free pass for human/indexer/unknown traffic.
    AllowedVisit,
    /// An AI agent was challenged and is expected to pay.
    BlockedPendingPayment,
    /// A payment verified and access was granted.
    PaymentAccepted,
    /// A payment was submitted but did not check out.
    PaymentRejected,
}

impl ActionKind {
    /// All kinds, in recording order of a typical paid visit.
    pub const ALL: [Self; 4] = [
        Self::AllowedVisit,
        Self::BlockedPendingPayment,
        Self::PaymentAccepted,
        Self::PaymentRejected,
    ];

    /// Stable textual label, used on the wire and in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllowedVisit => "ALLOWED_VISIT",
            Self::BlockedPendingPayment => "BLOCKED_PENDING_PAYMENT",
            Self::PaymentAccepted => "PAYMENT_ACCEPTED",
            Self::PaymentRejected => "PAYMENT_REJECTED",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an [`ActionKind`] label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action kind {0:?}")]
pub struct UnknownActionKind(pub String);

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownActionKind(s.to_owned()))
    }
}

/// One immutable access-decision record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Store-assigned id, monotonically increasing.
    pub id: i64,
    /// Correlation id of the request that produced this entry.
    pub correlation_id: String,
    /// Who acted: the declared identity string of the visitor.
    pub actor_id: String,
    /// What was decided.
    pub action_kind: ActionKind,
    /// Toll amount involved; zero for free and denied outcomes.
    pub amount: Decimal,
    /// Structured context: classification, reason code, payer, tx ref,
    /// resource path.
    pub details: serde_json::Value,
    /// When the entry was recorded.
    pub timestamp: UnixTimestamp,
}

/// A ledger entry before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    /// Correlation id of the originating request.
    pub correlation_id: String,
    /// Declared identity string of the visitor.
    pub actor_id: String,
    /// What was decided.
    pub action_kind: ActionKind,
    /// Toll amount involved.
    pub amount: Decimal,
    /// Structured context.
    pub details: serde_json::Value,
    /// Decision time.
    pub timestamp: UnixTimestamp,
}

impl NewLedgerEntry {
    /// Creates an entry with zero amount, empty details, and the current
    /// time.
    #[must_use]
    pub fn new(
        correlation_id: impl Into<String>,
        actor_id: impl Into<String>,
        action_kind: ActionKind,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            actor_id: actor_id.into(),
            action_kind,
            amount: Decimal::ZERO,
            details: serde_json::Value::Null,
            timestamp: UnixTimestamp::now(),
        }
    }

    /// Sets the toll amount.
    #[must_use]
    pub const fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    /// Sets the structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Filters for the read-only ledger query surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LedgerQuery {
    /// Only entries of this kind.
    pub kind: Option<ActionKind>,
    /// Page size; clamped to [`MAX_PAGE_SIZE`], defaults to
    /// [`DEFAULT_PAGE_SIZE`].
    pub limit: Option<u32>,
    /// Only entries with an id strictly below this cursor.
    pub before: Option<i64>,
}

impl LedgerQuery {
    /// The page size after defaulting and clamping.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of ledger entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPage {
    /// The entries, ordered newest first.
    pub entries: Vec<LedgerEntry>,
    /// Cursor for the next page; `None` when the history is exhausted.
    pub next_before: Option<i64>,
}

/// Outcome of an atomic claim-and-append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The proof was fresh; it is now claimed and the entry is recorded.
    Claimed(LedgerEntry),
    /// The proof was already spent by an earlier grant; nothing was
    /// written.
    AlreadySpent,
}

/// The append-only decision ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Appends an entry.
    async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// Claims `tx_ref` as spent and appends `entry` in one atomic step.
    ///
    /// Exactly one concurrent caller per `tx_ref` observes
    /// [`ClaimOutcome::Claimed`]; everyone else gets
    /// [`ClaimOutcome::AlreadySpent`].
    async fn claim_and_append(
        &self,
        tx_ref: &str,
        entry: NewLedgerEntry,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Returns a filtered page of entries, newest first.
    async fn query(&self, query: LedgerQuery) -> Result<LedgerPage, StoreError>;

    /// Returns every entry written for a request correlation id.
    async fn find_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}
