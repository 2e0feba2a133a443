//! Shared fixtures for the in-crate test suites.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tollgate::chain::{LookupError, TxLookup, TxRecord};
use tollgate::tenant::{TenantConfig, TenantDirectory};
use tollgate::verify::PaymentVerifier;
use tollgate::wallet::{CustodyClient, CustodyError, ManagedWallet};
use tollgate_chain::WalletProvisioner;
use tollgate_store::{GatewayStore, RetryingLedger};

use crate::gate::Gateway;

pub(crate) const TENANT: &str = "blog";
pub(crate) const PAYEE: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

pub(crate) fn tx_ref(fill: char) -> String {
    format!("0x{}", fill.to_string().repeat(64))
}

pub(crate) fn paid_record(tx_ref: &str, base_units: &str) -> TxRecord {
    TxRecord {
        tx_ref: tx_ref.to_owned(),
        from: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_owned(),
        to: PAYEE.to_owned(),
        amount: base_units.to_owned(),
        asset: "USDC".to_owned(),
        decimals: 6,
        finalized: true,
    }
}

/// Chain lookup over a fixed set of records.
pub(crate) struct StaticLookup {
    records: HashMap<String, TxRecord>,
}

impl StaticLookup {
    pub(crate) fn with(records: impl IntoIterator<Item = TxRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: records.into_iter().map(|r| (r.tx_ref.clone(), r)).collect(),
        })
    }
}

#[async_trait]
impl TxLookup for StaticLookup {
    async fn lookup(&self, tx_ref: &str) -> Result<TxRecord, LookupError> {
        self.records
            .get(tx_ref)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(tx_ref.to_owned()))
    }
}

/// Custody stub that always refuses, so provisioning exercises the local
/// fallback without any network.
pub(crate) struct RefusingCustody;

#[async_trait]
impl CustodyClient for RefusingCustody {
    async fn create_wallet(
        &self,
        _tenant_id: &str,
        _network: &str,
    ) -> Result<ManagedWallet, CustodyError> {
        Err(CustodyError::Rejected("custody disabled in tests".to_owned()))
    }
}

/// Everything a gate test needs, wired over an in-memory store.
pub(crate) struct TestRig {
    pub(crate) gateway: Gateway,
    pub(crate) ledger: Arc<RetryingLedger>,
    pub(crate) directory: TenantDirectory,
}

/// Builds a rig around the given verifier, with tenant [`TENANT`] priced
/// at 0.002 USDC paying to [`PAYEE`]. Must run inside a tokio runtime.
pub(crate) fn rig(verifier: PaymentVerifier) -> TestRig {
    let store = GatewayStore::open_in_memory().expect("in-memory store");
    let ledger = Arc::new(RetryingLedger::spawn(Arc::new(store.ledger())));

    let directory = TenantDirectory::new();
    directory.upsert(
        TENANT,
        TenantConfig::new("0.002".parse().expect("price")).with_pay_to(PAYEE),
    );

    let provisioner = Arc::new(WalletProvisioner::new(
        Arc::new(RefusingCustody),
        Arc::new(store.wallets()),
    ));

    let gateway = Gateway::new(
        directory.clone(),
        provisioner,
        verifier,
        Arc::clone(&ledger),
    );
    TestRig {
        gateway,
        ledger,
        directory,
    }
}

/// Builds a rig whose verifier resolves exactly the given chain records.
pub(crate) fn rig_with(records: impl IntoIterator<Item = TxRecord>) -> TestRig {
    rig(PaymentVerifier::new(StaticLookup::with(records)))
}
