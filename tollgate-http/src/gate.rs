//! The decision engine behind the gate.
//!
//! One request runs from classification to a logged terminal decision:
//!
//! ```text
//! RECEIVED -> CLASSIFIED -> ALLOWED ----------------------> LOGGED
//!                        \-> CHALLENGED (no proof) -------> LOGGED
//!                             \-> VERIFYING -> GRANTED ---> LOGGED
//!                                          \-> DENIED ----> LOGGED
//! ```
//!
//! [`Gateway::decide`] owns the sequencing; everything it calls is
//! injected. The ledger write for a decision completes, or is durably
//! queued, before `decide` returns, so the transport layer may release
//! the response the moment it holds a [`GateDecision`]. The pipeline
//! itself runs on a detached task: a peer that hangs up mid-flight
//! drops the `decide` future, not the verification or the write.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode};
use tollgate::challenge::{
    Challenge, MSG_PAYMENT_INVALID, MSG_PAYMENT_REQUIRED, MSG_VERIFICATION_RETRY,
};
use tollgate::classify::Classification;
use tollgate::decision::AccessDecision;
use tollgate::proof::PaymentProof;
use tollgate::request::IncomingRequest;
use tollgate::tenant::{TenantConfig, TenantDirectory};
use tollgate::verify::{ExpectedPayment, PaymentVerifier, ReasonCode, VerificationResult};
use tollgate_chain::WalletProvisioner;
use tollgate_store::{ClaimDecision, DurableOutcome, RetryingLedger};

use crate::error::GatewayError;
use crate::headers::{CORRELATION_HEADER, PROTOCOL_HEADER};

/// Default wall-clock budget for verifying one payment proof.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// The assembled decision engine.
///
/// Every field is a shared handle, so cloning is cheap and every clone
/// drives the same directory, clients, and ledger; every request takes
/// the same path through [`Self::decide`]. Tenant configuration is read
/// per request from the injected [`TenantDirectory`], so directory swaps
/// apply to the next request without a rebuild.
#[derive(Debug, Clone)]
pub struct Gateway {
    directory: TenantDirectory,
    provisioner: Arc<WalletProvisioner>,
    verifier: PaymentVerifier,
    ledger: Arc<RetryingLedger>,
    verify_timeout: Duration,
}

impl Gateway {
    /// Assembles a gateway from its injected parts.
    #[must_use]
    pub fn new(
        directory: TenantDirectory,
        provisioner: Arc<WalletProvisioner>,
        verifier: PaymentVerifier,
        ledger: Arc<RetryingLedger>,
    ) -> Self {
        Self {
            directory,
            provisioner,
            verifier,
            ledger,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    /// Overrides the verification time budget.
    #[must_use]
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Runs one request through the gate to a logged terminal decision.
    ///
    /// The pipeline runs on a detached task. Dropping the returned future
    /// mid-flight, as a hung-up connection does, abandons the answer but
    /// not the work: verification still finishes and the decision still
    /// reaches the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownTenant`] when the directory has no
    /// entry for the request's tenant, [`GatewayError::Provisioning`]
    /// when the tenant has no configured payee and no wallet could be
    /// provisioned, and [`GatewayError::DecisionHalted`] when the detached
    /// task stops without an answer. Payment failures are not errors: they
    /// come back as denied or challenged decisions.
    pub async fn decide(&self, request: IncomingRequest) -> Result<GateDecision, GatewayError> {
        let config = self
            .directory
            .get(request.tenant_id())
            .ok_or_else(|| GatewayError::UnknownTenant(request.tenant_id().to_owned()))?;

        // A dropped caller must not cancel verification, the proof claim,
        // or the ledger write: the pipeline runs detached, and this future
        // only relays its outcome.
        let gateway = self.clone();
        let pipeline = tokio::spawn(async move { gateway.decide_inner(&config, request).await });
        pipeline
            .await
            .map_err(|err| GatewayError::DecisionHalted(err.to_string()))?
    }

    /// Classification through logged terminal decision; the body of the
    /// detached decision task.
    async fn decide_inner(
        &self,
        config: &TenantConfig,
        request: IncomingRequest,
    ) -> Result<GateDecision, GatewayError> {
        let classification = config.classifier().classify(request.identity());
        tracing::debug!(
            correlation = %request.correlation_id(),
            tenant = %request.tenant_id(),
            identity = %request.identity(),
            %classification,
            "request classified"
        );

        let (decision, write) = if classification.is_free() {
            let decision = AccessDecision::Allowed { classification };
            let write = self.append(&request, classification, &decision).await;
            (decision, write)
        } else {
            self.gate_paying(&request, classification, config).await?
        };

        tracing::info!(
            correlation = %request.correlation_id(),
            state = %decision.state(),
            kind = %decision.action_kind(),
            "decision logged"
        );
        Ok(GateDecision {
            request,
            classification,
            decision,
            write,
        })
    }

    /// The paying path: challenge when no proof was sent, otherwise
    /// verify the proof and claim it on grant.
    async fn gate_paying(
        &self,
        request: &IncomingRequest,
        classification: Classification,
        config: &TenantConfig,
    ) -> Result<(AccessDecision, DurableOutcome), GatewayError> {
        let payee = self.resolve_payee(request.tenant_id(), config).await?;
        let challenge = Challenge::issue(config, payee.clone());

        let Some(raw) = request.proof_header() else {
            let decision = AccessDecision::Challenged { challenge };
            let write = self.append(request, classification, &decision).await;
            return Ok((decision, write));
        };

        let proof = match PaymentProof::parse_header(raw) {
            Ok(proof) => proof,
            Err(err) => {
                tracing::debug!(
                    correlation = %request.correlation_id(),
                    %err,
                    "rejecting unparseable payment header"
                );
                return Ok(self
                    .deny(request, classification, ReasonCode::Malformed, challenge)
                    .await);
            }
        };

        let expected = ExpectedPayment::for_tenant(config, payee);
        let verification = self.verify_bounded(request, &proof, &expected).await;

        if !verification.is_accepted() {
            let reason = verification.reason.unwrap_or(ReasonCode::Upstream);
            return Ok(self.deny(request, classification, reason, challenge).await);
        }

        let decision = AccessDecision::Granted {
            paid_amount: verification.paid_amount.unwrap_or(expected.min_amount),
            payer: verification.payer.unwrap_or_default(),
            tx_ref: proof.canonical_ref(),
        };
        let entry = decision.to_ledger_entry(request, classification);
        match self.ledger.claim_durable(&proof.canonical_ref(), entry).await {
            ClaimDecision::Granted(write) => Ok((decision, write)),
            ClaimDecision::Replayed => {
                tracing::info!(
                    correlation = %request.correlation_id(),
                    tx_ref = %proof.canonical_ref(),
                    "payment proof already spent"
                );
                Ok(self
                    .deny(request, classification, ReasonCode::Replayed, challenge)
                    .await)
            }
        }
    }

    /// Verifies within the configured time budget; an elapsed budget is a
    /// retryable `TIMEOUT`, never an unwind.
    async fn verify_bounded(
        &self,
        request: &IncomingRequest,
        proof: &PaymentProof,
        expected: &ExpectedPayment,
    ) -> VerificationResult {
        match tokio::time::timeout(self.verify_timeout, self.verifier.verify(proof, expected)).await
        {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(
                    correlation = %request.correlation_id(),
                    budget = ?self.verify_timeout,
                    "verification exceeded its time budget"
                );
                VerificationResult::error(ReasonCode::Timeout)
            }
        }
    }

    async fn deny(
        &self,
        request: &IncomingRequest,
        classification: Classification,
        reason: ReasonCode,
        challenge: Challenge,
    ) -> (AccessDecision, DurableOutcome) {
        let decision = AccessDecision::Denied { reason, challenge };
        let write = self.append(request, classification, &decision).await;
        (decision, write)
    }

    async fn append(
        &self,
        request: &IncomingRequest,
        classification: Classification,
        decision: &AccessDecision,
    ) -> DurableOutcome {
        self.ledger
            .append_durable(decision.to_ledger_entry(request, classification))
            .await
    }

    /// Resolves the payee address: the tenant's configured `pay_to`, or
    /// its provisioned wallet.
    async fn resolve_payee(
        &self,
        tenant_id: &str,
        config: &TenantConfig,
    ) -> Result<String, GatewayError> {
        if let Some(pay_to) = &config.pay_to {
            return Ok(pay_to.clone());
        }
        let wallet = self.provisioner.provision(tenant_id, &config.network).await?;
        Ok(wallet.address)
    }
}

/// A decided, logged request, ready for response construction.
#[derive(Debug)]
pub struct GateDecision {
    /// The request envelope the decision was made for.
    pub request: IncomingRequest,
    /// Traffic category the identity resolved to.
    pub classification: Classification,
    /// The terminal decision.
    pub decision: AccessDecision,
    /// How the decision's ledger entry reached durability.
    pub write: DurableOutcome,
}

impl GateDecision {
    /// Whether the request should reach the protected resource.
    #[must_use]
    pub const fn passes(&self) -> bool {
        matches!(
            self.decision,
            AccessDecision::Allowed { .. } | AccessDecision::Granted { .. }
        )
    }

    /// Builds the `402 Payment Required` response for a blocking decision.
    ///
    /// Returns `None` when the request passes. Denial bodies re-serve the
    /// challenge so the client can pay, or retry, without another probe;
    /// the message distinguishes retryable failures from final ones but
    /// never reveals which validation failed.
    #[must_use]
    pub fn blocking_response(&self) -> Option<Response> {
        let (challenge, message) = match &self.decision {
            AccessDecision::Allowed { .. } | AccessDecision::Granted { .. } => return None,
            AccessDecision::Challenged { challenge } => (challenge, MSG_PAYMENT_REQUIRED),
            AccessDecision::Denied { reason, challenge } if reason.is_retryable() => {
                (challenge, MSG_VERIFICATION_RETRY)
            }
            AccessDecision::Denied { challenge, .. } => (challenge, MSG_PAYMENT_INVALID),
        };

        let mut response =
            (StatusCode::PAYMENT_REQUIRED, Json(challenge.body(message))).into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge.protocol_version) {
            response.headers_mut().insert(PROTOCOL_HEADER, value);
        }
        self.stamp(&mut response);
        Some(response)
    }

    /// Stamps the correlation id onto an outgoing response.
    pub fn stamp(&self, response: &mut Response) {
        if let Ok(value) = HeaderValue::from_str(self.request.correlation_id()) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
    }
}
