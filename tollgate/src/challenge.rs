//! Toll challenges and the fixed "payment required" wire body.
//!
//! A challenge tells a paying client everything it needs: the price, the
//! currency, the payee address, and the protocol version. Challenges are
//! stateless: price and payee are deterministic per tenant, so the gateway
//! never has to remember what it issued. Replay safety comes from the
//! spent-proof claim at grant time, not from per-challenge nonces.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tenant::TenantConfig;
use crate::timestamp::UnixTimestamp;

/// Error label carried by every challenge body.
pub const CHALLENGE_ERROR: &str = "Payment Required";

/// Message on a fresh challenge.
pub const MSG_PAYMENT_REQUIRED: &str =
    "Access to this resource requires payment. Send the listed price to the pay_to \
     address and retry with your payment reference.";

/// Message when a submitted payment did not check out.
///
/// Deliberately generic: it never reveals which validation check failed.
pub const MSG_PAYMENT_INVALID: &str = "Invalid or insufficient payment.";

/// Message when verification could not complete and the client should retry.
pub const MSG_VERIFICATION_RETRY: &str =
    "Payment verification is temporarily unavailable. Retry in a few seconds.";

/// A machine-payable toll challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Toll price in `currency` units.
    pub price: Decimal,
    /// Asset symbol the price is denominated in.
    pub currency: String,
    /// Destination address a valid payment must target.
    pub payee_address: String,
    /// Protocol version string, e.g. `toll/1`.
    pub protocol_version: String,
    /// When the challenge was issued.
    pub issued_at: UnixTimestamp,
}

impl Challenge {
    /// Issues a challenge for a tenant with the resolved payee address.
    ///
    /// Deterministic given the tenant configuration; `issued_at` is the only
    /// per-call value.
    #[must_use]
    pub fn issue(config: &TenantConfig, payee_address: impl Into<String>) -> Self {
        let challenge = Self {
            price: config.price,
            currency: config.currency.clone(),
            payee_address: payee_address.into(),
            protocol_version: config.protocol_version.clone(),
            issued_at: UnixTimestamp::now(),
        };
        tracing::debug!(
            price = %challenge.price,
            currency = %challenge.currency,
            payee = %challenge.payee_address,
            "issued toll challenge"
        );
        challenge
    }

    /// Builds the wire body for this challenge with the given message.
    #[must_use]
    pub fn body(&self, message: impl Into<String>) -> ChallengeBody {
        ChallengeBody {
            error: CHALLENGE_ERROR.to_owned(),
            message: message.into(),
            pay_to: self.payee_address.clone(),
            currency: self.currency.clone(),
            price: self.price,
        }
    }
}

/// Fixed wire shape of the "payment required" response body.
///
/// ```json
/// {
///   "error": "Payment Required",
///   "message": "Access to this resource requires payment. ...",
///   "pay_to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
///   "currency": "USDC",
///   "price": "0.002"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeBody {
    /// Always [`CHALLENGE_ERROR`].
    pub error: String,
    /// Human- and machine-readable hint for the paying client.
    pub message: String,
    /// Destination address a valid payment must target.
    pub pay_to: String,
    /// Asset symbol the price is denominated in.
    pub currency: String,
    /// Toll price as a decimal string.
    pub price: Decimal,
}
