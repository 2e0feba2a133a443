//! Cross-cutting error types shared by the store and provisioning seams.

use crate::wallet::CustodyError;

/// Failures at the durable-store boundary.
///
/// The store traits live in this crate while implementations live in
/// `tollgate-store`; backend-specific errors are flattened into these
/// variants so core logic never depends on a database crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("storage backend failure: {0}")]
    Backend(String),
    /// A uniqueness constraint fired.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    /// The stored bytes did not decode into the expected shape.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

/// Wallet provisioning exhausted every path.
///
/// Raised only when the managed custody call failed *and* the local
/// fallback could not produce a wallet either; fatal for that tenant's
/// onboarding and surfaced to the operator.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// Both the custody path and the local fallback failed.
    #[error("wallet provisioning exhausted for tenant {tenant}: custody: {custody}; fallback: {fallback}")]
    Exhausted {
        /// Tenant whose onboarding failed.
        tenant: String,
        /// Why the managed custody path failed.
        #[source]
        custody: CustodyError,
        /// Why the local fallback failed.
        fallback: String,
    },
    /// The wallet store failed while persisting or reading the wallet.
    #[error("wallet store failure for tenant {tenant}")]
    Store {
        /// Tenant whose wallet could not be stored or read.
        tenant: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

impl ProvisioningError {
    /// Tenant the failure concerns.
    #[must_use]
    pub fn tenant(&self) -> &str {
        match self {
            Self::Exhausted { tenant, .. } | Self::Store { tenant, .. } => tenant,
        }
    }
}
