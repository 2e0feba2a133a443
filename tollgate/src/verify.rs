//! Payment verification against the external chain.
//!
//! Verification is a fixed pipeline over an untrusted proof: reference
//! shape, chain lookup, finality, asset, amount, destination. Every exit is
//! typed; a definitive `REJECTED` is never conflated with a retryable
//! `ERROR`.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain::{LookupError, TxLookup};
use crate::proof::{PaymentProof, is_well_formed_tx_ref};
use crate::tenant::TenantConfig;

/// Verification outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyStatus {
    /// The payment checks out.
    Accepted,
    /// The payment is definitively unacceptable; resubmitting the same
    /// proof cannot succeed.
    Rejected,
    /// Verification could not complete; the client should retry.
    Error,
}

/// Why a verification did not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// The proof is not a well-formed transaction reference.
    Malformed,
    /// The chain index does not know the reference (yet).
    NotFound,
    /// The paid amount is below the tenant's price.
    Insufficient,
    /// The payment went to an address other than the tenant's payee.
    WrongDestination,
    /// The payment used an asset other than the tenant's currency.
    WrongAsset,
    /// The transaction exists but is not final yet.
    NotFinal,
    /// The proof was already spent on an earlier grant.
    Replayed,
    /// Verification exceeded its time budget.
    Timeout,
    /// The chain index failed or was unreachable.
    Upstream,
}

impl ReasonCode {
    /// Whether a client retry can plausibly succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::NotFound | Self::NotFinal | Self::Timeout | Self::Upstream)
    }
}

impl Display for ReasonCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Malformed => "MALFORMED",
            Self::NotFound => "NOT_FOUND",
            Self::Insufficient => "INSUFFICIENT",
            Self::WrongDestination => "WRONG_DESTINATION",
            Self::WrongAsset => "WRONG_ASSET",
            Self::NotFinal => "NOT_FINAL",
            Self::Replayed => "REPLAYED",
            Self::Timeout => "TIMEOUT",
            Self::Upstream => "UPSTREAM",
        };
        write!(f, "{label}")
    }
}

/// What a valid payment must look like for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedPayment {
    /// Minimum acceptable amount, in decimal units of `currency`.
    pub min_amount: Decimal,
    /// Destination address a valid payment must target.
    pub payee_address: String,
    /// Asset symbol the payment must use.
    pub currency: String,
}

impl ExpectedPayment {
    /// Builds the expectation for a tenant with the resolved payee address.
    #[must_use]
    pub fn for_tenant(config: &TenantConfig, payee_address: impl Into<String>) -> Self {
        Self {
            min_amount: config.price,
            payee_address: payee_address.into(),
            currency: config.currency.clone(),
        }
    }
}

/// Result of verifying one payment proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Outcome status.
    pub status: VerifyStatus,
    /// Amount actually paid, present on `ACCEPTED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<Decimal>,
    /// Resolved payer identity, present on `ACCEPTED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Failure reason, present on `REJECTED` and `ERROR`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl VerificationResult {
    /// An accepted payment with its resolved amount and payer.
    #[must_use]
    pub fn accepted(paid_amount: Decimal, payer: impl Into<String>) -> Self {
        Self {
            status: VerifyStatus::Accepted,
            paid_amount: Some(paid_amount),
            payer: Some(payer.into()),
            reason: None,
        }
    }

    /// A definitive rejection.
    #[must_use]
    pub const fn rejected(reason: ReasonCode) -> Self {
        Self {
            status: VerifyStatus::Rejected,
            paid_amount: None,
            payer: None,
            reason: Some(reason),
        }
    }

    /// A retryable verification failure.
    #[must_use]
    pub const fn error(reason: ReasonCode) -> Self {
        Self {
            status: VerifyStatus::Error,
            paid_amount: None,
            payer: None,
            reason: Some(reason),
        }
    }

    /// Whether the payment was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status == VerifyStatus::Accepted
    }

    /// Whether the client should retry (status is `ERROR`).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status == VerifyStatus::Error
    }
}

/// Policy knobs for the verifier.
///
/// The default policy is strict on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifierPolicy {
    /// Downgrades a destination mismatch from a hard rejection to a logged
    /// warning.
    ///
    /// Exists for test rigs paying a shared faucet address. Never enable in
    /// production: it accepts payments sent to arbitrary addresses.
    pub lenient_destination: bool,
}

/// Verifies payment proofs against an injected chain lookup.
#[derive(Clone)]
pub struct PaymentVerifier {
    lookup: Arc<dyn TxLookup>,
    policy: VerifierPolicy,
}

impl std::fmt::Debug for PaymentVerifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentVerifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PaymentVerifier {
    /// Creates a verifier with the default (strict) policy.
    #[must_use]
    pub fn new(lookup: Arc<dyn TxLookup>) -> Self {
        Self { lookup, policy: VerifierPolicy::default() }
    }

    /// Overrides the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: VerifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Verifies a proof against the expected payment parameters.
    ///
    /// Infallible by contract: every failure mode is a value, so callers
    /// branch on [`VerifyStatus`] rather than unwinding.
    pub async fn verify(
        &self,
        proof: &PaymentProof,
        expected: &ExpectedPayment,
    ) -> VerificationResult {
        let tx_ref = proof.canonical_ref();
        if !is_well_formed_tx_ref(&tx_ref) {
            return VerificationResult::rejected(ReasonCode::Malformed);
        }

        let record = match self.lookup.lookup(&tx_ref).await {
            Ok(record) => record,
            Err(LookupError::NotFound(_)) => {
                return VerificationResult::error(ReasonCode::NotFound);
            }
            Err(LookupError::TimedOut(elapsed)) => {
                tracing::warn!(tx_ref = %tx_ref, ?elapsed, "chain lookup timed out");
                return VerificationResult::error(ReasonCode::Timeout);
            }
            Err(LookupError::Upstream(message)) => {
                tracing::warn!(tx_ref = %tx_ref, %message, "chain lookup failed upstream");
                return VerificationResult::error(ReasonCode::Upstream);
            }
        };

        if !record.finalized {
            return VerificationResult::error(ReasonCode::NotFinal);
        }

        if !record.asset.eq_ignore_ascii_case(&expected.currency) {
            return VerificationResult::rejected(ReasonCode::WrongAsset);
        }

        let Some(paid) = record.amount_decimal() else {
            tracing::warn!(tx_ref = %tx_ref, amount = %record.amount, "uninterpretable amount in chain record");
            return VerificationResult::error(ReasonCode::Upstream);
        };

        if paid < expected.min_amount {
            return VerificationResult::rejected(ReasonCode::Insufficient);
        }

        if !addresses_match(&record.to, &expected.payee_address) {
            if self.policy.lenient_destination {
                tracing::warn!(
                    tx_ref = %tx_ref,
                    paid_to = %record.to,
                    expected = %expected.payee_address,
                    "destination mismatch accepted under lenient test policy"
                );
            } else {
                return VerificationResult::rejected(ReasonCode::WrongDestination);
            }
        }

        VerificationResult::accepted(paid, record.from)
    }
}

/// Case-insensitive address comparison (hex addresses carry mixed-case
/// checksums that do not change identity).
#[must_use]
pub fn addresses_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
