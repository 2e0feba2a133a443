//! Client-submitted payment proofs.
//!
//! A proof arrives in an authorization-style header: a scheme token
//! followed by the transaction reference, `Toll <txRef>`. The reference is
//! opaque and untrusted at this layer: header parsing only separates
//! scheme from reference. Well-formedness and on-chain truth are the
//! verifier's job.

use serde::{Deserialize, Serialize};

/// Scheme token expected in the payment header, matched case-insensitively.
pub const PROOF_SCHEME: &str = "Toll";

/// An unverified payment reference submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentProof {
    tx_ref: String,
}

impl PaymentProof {
    /// Wraps a raw transaction reference without validating it.
    #[must_use]
    pub fn new(tx_ref: impl Into<String>) -> Self {
        Self { tx_ref: tx_ref.into() }
    }

    /// Parses a `"<scheme> <txRef>"` header value.
    ///
    /// Accepts any casing of the scheme token. The reference itself is not
    /// validated here; a garbage reference surfaces later as a
    /// `MALFORMED` rejection.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedProofError`] when the header is empty, lacks a
    /// reference, or names a scheme other than [`PROOF_SCHEME`].
    pub fn parse_header(value: &str) -> Result<Self, MalformedProofError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(MalformedProofError::Empty);
        }
        let (scheme, rest) = value
            .split_once(char::is_whitespace)
            .ok_or(MalformedProofError::MissingReference)?;
        let tx_ref = rest.trim();
        if tx_ref.is_empty() {
            return Err(MalformedProofError::MissingReference);
        }
        if !scheme.eq_ignore_ascii_case(PROOF_SCHEME) {
            return Err(MalformedProofError::UnknownScheme(scheme.to_owned()));
        }
        Ok(Self::new(tx_ref))
    }

    /// The transaction reference exactly as submitted.
    #[must_use]
    pub fn tx_ref(&self) -> &str {
        &self.tx_ref
    }

    /// The reference in canonical form (lowercased hex), used for lookups
    /// and spent-proof claims so casing games cannot dodge the replay
    /// guard.
    #[must_use]
    pub fn canonical_ref(&self) -> String {
        self.tx_ref.to_lowercase()
    }

    /// Renders the header value for this proof.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{PROOF_SCHEME} {}", self.tx_ref)
    }
}

/// Returns `true` when `tx_ref` looks like a 32-byte hex transaction
/// reference (`0x` + 64 hex digits).
#[must_use]
pub fn is_well_formed_tx_ref(tx_ref: &str) -> bool {
    let Some(hex) = tx_ref.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Reasons a payment header failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedProofError {
    /// The header value was empty or whitespace.
    #[error("payment header is empty")]
    Empty,
    /// The header had a scheme token but no transaction reference.
    #[error("payment header is missing the transaction reference")]
    MissingReference,
    /// The header named a scheme this gateway does not accept.
    #[error("unrecognized payment scheme {0:?}")]
    UnknownScheme(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_and_reference() {
        let proof = PaymentProof::parse_header("Toll 0xabc123").unwrap();
        assert_eq!(proof.tx_ref(), "0xabc123");
        assert_eq!(proof.header_value(), "Toll 0xabc123");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(PaymentProof::parse_header("toll 0xabc").is_ok());
        assert!(PaymentProof::parse_header("TOLL 0xabc").is_ok());
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = PaymentProof::parse_header("Bearer 0xabc").unwrap_err();
        assert_eq!(err, MalformedProofError::UnknownScheme("Bearer".to_owned()));
    }

    #[test]
    fn rejects_empty_and_missing_reference() {
        assert_eq!(PaymentProof::parse_header("   ").unwrap_err(), MalformedProofError::Empty);
        assert_eq!(
            PaymentProof::parse_header("Toll").unwrap_err(),
            MalformedProofError::MissingReference
        );
        assert_eq!(
            PaymentProof::parse_header("Toll   ").unwrap_err(),
            MalformedProofError::MissingReference
        );
    }

    #[test]
    fn canonical_ref_lowercases() {
        let proof = PaymentProof::new("0xABCDEF");
        assert_eq!(proof.canonical_ref(), "0xabcdef");
    }

    #[test]
    fn well_formed_reference_shape() {
        let good = format!("0x{}", "a1".repeat(32));
        assert!(is_well_formed_tx_ref(&good));

        assert!(!is_well_formed_tx_ref("0xabc"));
        assert!(!is_well_formed_tx_ref(&"a1".repeat(33)));
        assert!(!is_well_formed_tx_ref(&format!("0x{}", "g1".repeat(32))));
        assert!(!is_well_formed_tx_ref("not-a-hash"));
    }
}
