//! The per-request state machine and terminal access decisions.
//!
//! ```text
//! RECEIVED -> CLASSIFIED -> ALLOWED ------------------------> LOGGED
//!                        \-> CHALLENGED (no proof) ---------> LOGGED
//!                             \-> VERIFYING -> GRANTED ------> LOGGED
//!                                          \-> DENIED -------> LOGGED
//! ```
//!
//! Every terminal decision is logged before the response is released; the
//! mapping from decision to ledger record lives here so the orchestrator
//! only sequences calls.

use std::fmt::{Display, Formatter};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::challenge::Challenge;
use crate::classify::Classification;
use crate::ledger::{ActionKind, NewLedgerEntry};
use crate::request::IncomingRequest;
use crate::verify::ReasonCode;

/// Lifecycle states of one gated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Envelope constructed, nothing decided.
    Received,
    /// Classification computed.
    Classified,
    /// Free traffic; passes.
    Allowed,
    /// Paying traffic without a proof; challenge goes out.
    Challenged,
    /// A proof is being verified against the chain.
    Verifying,
    /// Payment verified; access granted.
    Granted,
    /// Payment absent from the chain, invalid, or unverifiable.
    Denied,
    /// Terminal decision recorded in the ledger.
    Logged,
}

impl RequestState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Classified)
                | (Self::Classified, Self::Allowed | Self::Challenged)
                | (Self::Challenged, Self::Verifying | Self::Logged)
                | (Self::Verifying, Self::Granted | Self::Denied)
                | (Self::Allowed | Self::Granted | Self::Denied, Self::Logged)
        )
    }

    /// Whether this is a terminal decision state (one that must be logged
    /// before the response is released).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Allowed | Self::Challenged | Self::Granted | Self::Denied)
    }
}

impl Display for RequestState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Received => "RECEIVED",
            Self::Classified => "CLASSIFIED",
            Self::Allowed => "ALLOWED",
            Self::Challenged => "CHALLENGED",
            Self::Verifying => "VERIFYING",
            Self::Granted => "GRANTED",
            Self::Denied => "DENIED",
            Self::Logged => "LOGGED",
        };
        write!(f, "{label}")
    }
}

/// Terminal access decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Human/indexer/unknown traffic passes free.
    Allowed {
        /// The classification that let the request through.
        classification: Classification,
    },
    /// AI traffic without a proof: pay first.
    Challenged {
        /// The challenge to send back.
        challenge: Challenge,
    },
    /// Verified payment; access granted.
    Granted {
        /// Amount actually paid.
        paid_amount: Decimal,
        /// Resolved payer identity.
        payer: String,
        /// Canonical transaction reference that paid the toll.
        tx_ref: String,
    },
    /// Submitted payment did not check out; access denied.
    Denied {
        /// Why verification did not accept.
        reason: ReasonCode,
        /// Challenge to re-serve so the client can pay (or retry).
        challenge: Challenge,
    },
}

impl AccessDecision {
    /// The terminal state this decision represents.
    #[must_use]
    pub const fn state(&self) -> RequestState {
        match self {
            Self::Allowed { .. } => RequestState::Allowed,
            Self::Challenged { .. } => RequestState::Challenged,
            Self::Granted { .. } => RequestState::Granted,
            Self::Denied { .. } => RequestState::Denied,
        }
    }

    /// The ledger action kind this decision records as.
    #[must_use]
    pub const fn action_kind(&self) -> ActionKind {
        match self {
            Self::Allowed { .. } => ActionKind::AllowedVisit,
            Self::Challenged { .. } => ActionKind::BlockedPendingPayment,
            Self::Granted { .. } => ActionKind::PaymentAccepted,
            Self::Denied { .. } => ActionKind::PaymentRejected,
        }
    }

    /// Whether the request may succeed if simply resubmitted.
    #[must_use]
    pub const fn is_retryable_denial(&self) -> bool {
        matches!(self, Self::Denied { reason, .. } if reason.is_retryable())
    }

    /// Builds the ledger record for this decision.
    ///
    /// Amounts follow the recording rules: paid amount on grants, zero
    /// everywhere else. Context that varies per decision (reason, payer,
    /// transaction reference, asked price) goes into `details`.
    #[must_use]
    pub fn to_ledger_entry(
        &self,
        request: &IncomingRequest,
        classification: Classification,
    ) -> NewLedgerEntry {
        let mut details = serde_json::json!({
            "classification": classification,
            "tenantId": request.tenant_id(),
            "path": request.path(),
        });

        let entry = NewLedgerEntry::new(
            request.correlation_id(),
            request.identity(),
            self.action_kind(),
        );

        match self {
            Self::Allowed { .. } => entry.with_details(details),
            Self::Challenged { challenge } => {
                details["price"] = serde_json::json!(challenge.price);
                details["currency"] = serde_json::json!(challenge.currency);
                entry.with_details(details)
            }
            Self::Granted { paid_amount, payer, tx_ref } => {
                details["payer"] = serde_json::json!(payer);
                details["txRef"] = serde_json::json!(tx_ref);
                entry.with_amount(*paid_amount).with_details(details)
            }
            Self::Denied { reason, .. } => {
                details["reason"] = serde_json::json!(reason);
                entry.with_details(details)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::Challenge;
    use crate::tenant::TenantConfig;

    fn request() -> IncomingRequest {
        IncomingRequest::new("blog", "GPTBot/1.2", "/post/1")
    }

    fn challenge() -> Challenge {
        Challenge::issue(&TenantConfig::new("0.002".parse().unwrap()), "0xfeed")
    }

    #[test]
    fn legal_transitions() {
        use RequestState as S;
        let legal = [
            (S::Received, S::Classified),
            (S::Classified, S::Allowed),
            (S::Classified, S::Challenged),
            (S::Challenged, S::Verifying),
            (S::Challenged, S::Logged),
            (S::Verifying, S::Granted),
            (S::Verifying, S::Denied),
            (S::Allowed, S::Logged),
            (S::Granted, S::Logged),
            (S::Denied, S::Logged),
        ];
        for (from, to) in legal {
            assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
        }
    }

    #[test]
    fn illegal_transitions() {
        use RequestState as S;
        let illegal = [
            (S::Received, S::Allowed),
            (S::Received, S::Granted),
            (S::Classified, S::Verifying),
            (S::Allowed, S::Challenged),
            (S::Verifying, S::Logged),
            (S::Granted, S::Denied),
            (S::Logged, S::Received),
        ];
        for (from, to) in illegal {
            assert!(!from.can_transition_to(to), "{from} -> {to} should be illegal");
        }
    }

    #[test]
    fn terminal_states_require_logging() {
        assert!(RequestState::Allowed.is_terminal());
        assert!(RequestState::Challenged.is_terminal());
        assert!(RequestState::Granted.is_terminal());
        assert!(RequestState::Denied.is_terminal());
        assert!(!RequestState::Verifying.is_terminal());
        assert!(!RequestState::Logged.is_terminal());
    }

    #[test]
    fn allowed_records_zero_amount() {
        let decision = AccessDecision::Allowed { classification: Classification::SearchIndexer };
        let entry = decision.to_ledger_entry(&request(), Classification::SearchIndexer);
        assert_eq!(entry.action_kind, ActionKind::AllowedVisit);
        assert_eq!(entry.amount, Decimal::ZERO);
        assert_eq!(entry.details["classification"], "SEARCH_INDEXER");
        assert_eq!(entry.details["path"], "/post/1");
    }

    #[test]
    fn challenged_records_asked_price_in_details() {
        let decision = AccessDecision::Challenged { challenge: challenge() };
        let entry = decision.to_ledger_entry(&request(), Classification::AiAgent);
        assert_eq!(entry.action_kind, ActionKind::BlockedPendingPayment);
        assert_eq!(entry.amount, Decimal::ZERO);
        assert_eq!(entry.details["price"], "0.002");
    }

    #[test]
    fn granted_records_paid_amount_payer_and_ref() {
        let decision = AccessDecision::Granted {
            paid_amount: "0.002".parse().unwrap(),
            payer: "0xpayer".to_owned(),
            tx_ref: "0xabc".to_owned(),
        };
        let entry = decision.to_ledger_entry(&request(), Classification::AiAgent);
        assert_eq!(entry.action_kind, ActionKind::PaymentAccepted);
        assert_eq!(entry.amount, "0.002".parse().unwrap());
        assert_eq!(entry.details["payer"], "0xpayer");
        assert_eq!(entry.details["txRef"], "0xabc");
    }

    #[test]
    fn denied_records_reason_and_zero_amount() {
        let decision = AccessDecision::Denied {
            reason: ReasonCode::Insufficient,
            challenge: challenge(),
        };
        let entry = decision.to_ledger_entry(&request(), Classification::AiAgent);
        assert_eq!(entry.action_kind, ActionKind::PaymentRejected);
        assert_eq!(entry.amount, Decimal::ZERO);
        assert_eq!(entry.details["reason"], "INSUFFICIENT");
    }

    #[test]
    fn only_retryable_reasons_mark_retryable_denials() {
        let retryable = AccessDecision::Denied {
            reason: ReasonCode::NotFound,
            challenge: challenge(),
        };
        assert!(retryable.is_retryable_denial());

        let terminal = AccessDecision::Denied {
            reason: ReasonCode::Insufficient,
            challenge: challenge(),
        };
        assert!(!terminal.is_retryable_denial());

        let granted = AccessDecision::Granted {
            paid_amount: Decimal::ZERO,
            payer: String::new(),
            tx_ref: String::new(),
        };
        assert!(!granted.is_retryable_denial());
    }
}
