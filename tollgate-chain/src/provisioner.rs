//! Tenant wallet provisioning.
//!
//! Every tenant gets exactly one payee address. The provisioner tries
//! managed custody first; on any custody failure it generates a local key
//! pair and derives the address from it, tagged `LOCAL_FALLBACK`. The
//! durable [`WalletStore`] is the idempotence authority: a second
//! provisioning call for the same tenant returns the stored wallet instead
//! of minting a new address.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::hex;
use alloy_signer_local::PrivateKeySigner;
use dashmap::DashMap;
use tollgate::error::ProvisioningError;
use tollgate::wallet::{CustodyClient, Provenance, Wallet, WalletRecord, WalletStore};

/// Hands out the payee wallet for a tenant.
///
/// Shared state is an in-process read cache over the store; concurrent
/// calls for the same tenant are resolved by the store's atomic
/// `insert_or_get`, never by the cache.
pub struct WalletProvisioner {
    custody: Arc<dyn CustodyClient>,
    store: Arc<dyn WalletStore>,
    cache: DashMap<String, Wallet>,
}

impl WalletProvisioner {
    /// Creates a provisioner over a custody client and a wallet store.
    #[must_use]
    pub fn new(custody: Arc<dyn CustodyClient>, store: Arc<dyn WalletStore>) -> Self {
        Self {
            custody,
            store,
            cache: DashMap::new(),
        }
    }

    /// Returns the tenant's payee wallet, creating one if none exists.
    ///
    /// Resolution order: in-process cache, then the durable store, then
    /// custody with a local-key fallback. The freshly created wallet is
    /// persisted through `insert_or_get`, so a concurrent call racing this
    /// one converges on whichever wallet was stored first.
    ///
    /// # Errors
    ///
    /// [`ProvisioningError::Store`] when the store fails while reading or
    /// persisting; [`ProvisioningError::Exhausted`] when custody failed
    /// *and* the fallback wallet could not be persisted either.
    pub async fn provision(
        &self,
        tenant_id: &str,
        network: &str,
    ) -> Result<Wallet, ProvisioningError> {
        if let Some(wallet) = self.cache.get(tenant_id) {
            return Ok(wallet.clone());
        }

        let found = self
            .store
            .find(tenant_id)
            .await
            .map_err(|source| ProvisioningError::Store {
                tenant: tenant_id.to_owned(),
                source,
            })?;
        if let Some(wallet) = found {
            self.cache.insert(tenant_id.to_owned(), wallet.clone());
            return Ok(wallet);
        }

        let (record, custody_failure) = match self.custody.create_wallet(tenant_id, network).await {
            Ok(managed) => {
                let wallet = Wallet {
                    address: managed.address,
                    provenance: Provenance::Managed,
                    network: managed.network,
                };
                (WalletRecord::managed(wallet), None)
            }
            Err(custody_err) => {
                tracing::warn!(
                    tenant = tenant_id,
                    error = %custody_err,
                    "custody wallet creation failed, generating local fallback key"
                );
                let (wallet, key_hex) = generate_local_wallet(network);
                (WalletRecord::local(wallet, key_hex), Some(custody_err))
            }
        };

        let wallet = match (self.store.insert_or_get(tenant_id, &record).await, custody_failure) {
            (Ok(wallet), _) => wallet,
            (Err(source), None) => {
                return Err(ProvisioningError::Store {
                    tenant: tenant_id.to_owned(),
                    source,
                });
            }
            (Err(store_err), Some(custody)) => {
                return Err(ProvisioningError::Exhausted {
                    tenant: tenant_id.to_owned(),
                    custody,
                    fallback: store_err.to_string(),
                });
            }
        };

        tracing::info!(
            tenant = tenant_id,
            address = %wallet.address,
            provenance = %wallet.provenance,
            "provisioned tenant wallet"
        );
        self.cache.insert(tenant_id.to_owned(), wallet.clone());
        Ok(wallet)
    }
}

impl fmt::Debug for WalletProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletProvisioner")
            .field("cached_tenants", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Generates a fresh local key pair and derives its payee wallet.
///
/// Returns the wallet together with the hex-encoded private key so the
/// caller can persist the key alongside the wallet record; the key never
/// travels inside [`Wallet`] itself.
#[must_use]
pub fn generate_local_wallet(network: &str) -> (Wallet, String) {
    let signer = PrivateKeySigner::random();
    let wallet = Wallet {
        address: signer.address().to_string(),
        provenance: Provenance::LocalFallback,
        network: network.to_owned(),
    };
    let key_hex = hex::encode(signer.to_bytes());
    (wallet, key_hex)
}
