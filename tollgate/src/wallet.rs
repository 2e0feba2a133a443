//! Payee wallets and the custody/store seams behind provisioning.
//!
//! A tenant's wallet is created once at onboarding and immutable after
//! that. The gateway first asks a managed custody service for an address;
//! any custody failure falls back to a locally generated key pair. Both
//! branches are explicit tagged variants; provenance is always recorded,
//! never inferred from response shapes.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// How a tenant's payee wallet came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Created by the managed custody service.
    Managed,
    /// Generated locally after the custody path failed.
    LocalFallback,
}

impl Provenance {
    /// Stable textual label, used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "MANAGED",
            Self::LocalFallback => "LOCAL_FALLBACK",
        }
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`Provenance`] label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown wallet provenance {0:?}")]
pub struct UnknownProvenance(pub String);

impl FromStr for Provenance {
    type Err = UnknownProvenance;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANAGED" => Ok(Self::Managed),
            "LOCAL_FALLBACK" => Ok(Self::LocalFallback),
            other => Err(UnknownProvenance(other.to_owned())),
        }
    }
}

/// A tenant's payee wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Payment destination address.
    pub address: String,
    /// Which provisioning branch produced the wallet.
    pub provenance: Provenance,
    /// Network the address lives on.
    pub network: String,
}

/// A wallet plus the secret only local-fallback wallets carry.
///
/// Kept separate from [`Wallet`] so key material never rides along into
/// wire responses or ledger details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRecord {
    /// The wallet itself.
    pub wallet: Wallet,
    /// Hex-encoded private key for `LOCAL_FALLBACK` wallets; `None` for
    /// managed wallets, whose keys never leave custody.
    pub fallback_key: Option<String>,
}

impl WalletRecord {
    /// Record for a custody-managed wallet.
    #[must_use]
    pub const fn managed(wallet: Wallet) -> Self {
        Self { wallet, fallback_key: None }
    }

    /// Record for a locally generated wallet with its key.
    #[must_use]
    pub const fn local(wallet: Wallet, fallback_key: String) -> Self {
        Self { wallet, fallback_key: Some(fallback_key) }
    }
}

/// Typed response from the managed custody service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedWallet {
    /// Address created by custody.
    pub address: String,
    /// Network custody created the address on.
    pub network: String,
}

/// Custody-side failure modes; every one of them triggers the local
/// fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    /// The custody request exceeded its deadline.
    #[error("custody request timed out")]
    TimedOut,
    /// Custody reported its wallet quota exhausted.
    #[error("custody wallet quota exhausted")]
    QuotaExhausted,
    /// The response did not match the typed contract.
    #[error("custody returned a malformed response: {0}")]
    Malformed(String),
    /// Transport-level failure reaching custody.
    #[error("custody transport failure: {0}")]
    Transport(String),
    /// Custody refused the request.
    #[error("custody rejected wallet creation: {0}")]
    Rejected(String),
}

/// Managed custodial wallet creation.
#[async_trait]
pub trait CustodyClient: Send + Sync {
    /// Asks custody to create a wallet for `tenant_id` on `network`.
    ///
    /// # Errors
    ///
    /// Returns a [`CustodyError`]; callers treat every variant as "fall
    /// back locally".
    async fn create_wallet(
        &self,
        tenant_id: &str,
        network: &str,
    ) -> Result<ManagedWallet, CustodyError>;
}

/// Durable record store for provisioned wallets.
///
/// Idempotence lives here: `insert_or_get` must be atomic per tenant so
/// two concurrent provisioning calls can never both insert: one wins, the
/// other reads the winner back.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Returns the stored wallet for a tenant, if any.
    async fn find(&self, tenant_id: &str) -> Result<Option<Wallet>, StoreError>;

    /// Stores `record` for `tenant_id` unless a wallet already exists;
    /// returns whichever wallet is durably stored afterwards.
    async fn insert_or_get(
        &self,
        tenant_id: &str,
        record: &WalletRecord,
    ) -> Result<Wallet, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_labels_match_wire_form() {
        assert_eq!(Provenance::Managed.to_string(), "MANAGED");
        assert_eq!(Provenance::LocalFallback.to_string(), "LOCAL_FALLBACK");
        let json = serde_json::to_string(&Provenance::LocalFallback).unwrap();
        assert_eq!(json, "\"LOCAL_FALLBACK\"");
    }

    #[test]
    fn provenance_labels_round_trip() {
        assert_eq!("MANAGED".parse::<Provenance>().unwrap(), Provenance::Managed);
        assert_eq!(
            "LOCAL_FALLBACK".parse::<Provenance>().unwrap(),
            Provenance::LocalFallback
        );
        assert_eq!(
            "CUSTODIAL".parse::<Provenance>().unwrap_err(),
            UnknownProvenance("CUSTODIAL".to_owned())
        );
    }

    #[test]
    fn wallet_serializes_camel_case() {
        let wallet = Wallet {
            address: "0xfeed".to_owned(),
            provenance: Provenance::Managed,
            network: "base".to_owned(),
        };
        let json = serde_json::to_value(&wallet).unwrap();
        assert_eq!(json["address"], "0xfeed");
        assert_eq!(json["provenance"], "MANAGED");
        assert_eq!(json["network"], "base");
    }

    #[test]
    fn records_tag_key_material_by_branch() {
        let wallet = Wallet {
            address: "0xfeed".to_owned(),
            provenance: Provenance::LocalFallback,
            network: "base".to_owned(),
        };
        let record = WalletRecord::local(wallet.clone(), "8badf00d".to_owned());
        assert!(record.fallback_key.is_some());

        let record = WalletRecord::managed(Wallet { provenance: Provenance::Managed, ..wallet });
        assert!(record.fallback_key.is_none());
    }
}
