//! HTTP surface of the toll gateway.
//!
//! Puts a payment gate in front of axum/tower services: search indexers
//! and humans pass free, AI agents get a machine-payable `402 Payment
//! Required` challenge, and verified payments are granted access with an
//! audit trail in the decision ledger.
//!
//! # Modules
//!
//! - [`gate`] — the decision engine ([`Gateway`]) and its outcomes
//! - [`layer`] — tower middleware wiring the gate into a router
//! - [`handlers`] — operator endpoints (health, ledger queries)
//! - [`headers`] — toll protocol header names
//! - [`error`] — HTTP-facing error types

pub mod error;
pub mod gate;
pub mod handlers;
pub mod headers;
pub mod layer;

#[cfg(test)]
mod testutil;

pub use error::{AdminError, GatewayError};
pub use gate::{DEFAULT_VERIFY_TIMEOUT, GateDecision, Gateway};
pub use handlers::{AdminState, admin_router};
pub use layer::{TollGate, TollGateLayer, TollGateService};
