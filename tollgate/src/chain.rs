//! The injected transaction-lookup capability.
//!
//! The gateway never speaks to a blockchain directly. It is handed
//! something implementing [`TxLookup`] that can resolve a transaction
//! reference into a structured [`TxRecord`]; `tollgate-chain` provides an
//! HTTP client implementation and tests stub the trait.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A settled transfer as reported by the external chain index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRecord {
    /// Transaction reference (hash), canonical lowercase hex.
    pub tx_ref: String,
    /// Sender address.
    pub from: String,
    /// Destination address.
    pub to: String,
    /// Transferred amount in the asset's base units, as a decimal string.
    pub amount: String,
    /// Asset symbol, e.g. `USDC`.
    pub asset: String,
    /// Decimal scale of the asset (USDC: 6).
    pub decimals: u32,
    /// Whether the transaction is final on chain.
    pub finalized: bool,
}

impl TxRecord {
    /// Converts the base-unit amount into decimal units of the asset.
    ///
    /// Returns `None` when the amount does not parse, or the scale exceeds
    /// what a 96-bit decimal can carry; either way the record cannot be
    /// trusted for an amount comparison.
    #[must_use]
    pub fn amount_decimal(&self) -> Option<Decimal> {
        let base_units: i128 = self.amount.parse().ok()?;
        if base_units < 0 {
            return None;
        }
        Decimal::try_from_i128_with_scale(base_units, self.decimals)
            .ok()
            .map(|amount| amount.normalize())
    }
}

/// Failures resolving a transaction reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The reference is unknown to the chain index. Retryable: a
    /// just-submitted transaction may simply not be indexed yet.
    #[error("transaction {0} not found")]
    NotFound(String),
    /// The lookup exceeded its deadline. Retryable.
    #[error("transaction lookup timed out after {0:?}")]
    TimedOut(Duration),
    /// Transport or upstream failure. Retryable.
    #[error("transaction lookup failed upstream: {0}")]
    Upstream(String),
}

/// Resolves transaction references against the external payment ledger.
#[async_trait]
pub trait TxLookup: Send + Sync {
    /// Fetches the transaction record for `tx_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] for unknown references and the
    /// transport variants for infrastructure failures; implementations must
    /// never conflate the two.
    async fn lookup(&self, tx_ref: &str) -> Result<TxRecord, LookupError>;
}
