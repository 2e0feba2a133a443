//! Chain-facing clients for the tollgate gateway.
//!
//! The core crate defines the capabilities the gateway needs from the
//! outside world as traits; this crate supplies the HTTP-backed
//! implementations:
//!
//! - [`IndexerClient`] resolves submitted transaction references against a
//!   chain indexer's REST API ([`tollgate::chain::TxLookup`]).
//! - [`CustodyApiClient`] creates managed custodial wallets
//!   ([`tollgate::wallet::CustodyClient`]).
//! - [`WalletProvisioner`] combines custody, a local-key fallback, and a
//!   [`tollgate::wallet::WalletStore`] so every tenant ends up with exactly
//!   one payee address.
//!
//! Network name metadata used for configuration validation lives in
//! [`networks`].

pub mod custody;
pub mod lookup;
pub mod networks;
pub mod provisioner;

pub use custody::{CustodyApiClient, UnconfiguredCustody};
pub use lookup::{IndexerClient, IndexerClientError};
pub use provisioner::WalletProvisioner;
