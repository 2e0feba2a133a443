//! The per-request input envelope.

use std::fmt::Write as _;

use rand::RngExt;

/// Length of generated correlation ids.
const CORRELATION_ID_LEN: usize = 16;

/// An inbound request as the gateway sees it.
///
/// Immutable once constructed; built at request entry and discarded after
/// the response. Carries everything the decision flow needs and nothing
/// transport-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    correlation_id: String,
    tenant_id: String,
    identity: String,
    path: String,
    proof_header: Option<String>,
}

impl IncomingRequest {
    /// Builds a request envelope, minting a fresh correlation id.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        identity: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: mint_correlation_id(),
            tenant_id: tenant_id.into(),
            identity: identity.into(),
            path: path.into(),
            proof_header: None,
        }
    }

    /// Attaches the raw payment header value, if the client sent one.
    #[must_use]
    pub fn with_proof_header(mut self, value: impl Into<String>) -> Self {
        self.proof_header = Some(value.into());
        self
    }

    /// Correlation id for ledger round-trips.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Tenant/site identifier the request targets.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Declared origin identity string (user-agent analogue).
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Target resource path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw payment header value, if any.
    #[must_use]
    pub fn proof_header(&self) -> Option<&str> {
        self.proof_header.as_deref()
    }
}

/// Mints a random hex correlation id.
fn mint_correlation_id() -> String {
    let bytes: [u8; CORRELATION_ID_LEN / 2] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(CORRELATION_ID_LEN), |mut id, byte| {
            let _ = write!(id, "{byte:02x}");
            id
        })
}
