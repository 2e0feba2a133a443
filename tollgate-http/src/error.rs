//! Error types for the HTTP surface.
//!
//! Payment failures never surface here: they become 402 responses inside
//! the decision flow. These errors cover the cases where no decision could
//! be made at all (no such tenant, no payee address) and failures of the
//! operator read endpoints.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;
use tollgate::error::{ProvisioningError, StoreError};

/// A request the gateway could not carry to a decision.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request targets a tenant the directory does not know.
    #[error("unknown tenant {0:?}")]
    UnknownTenant(String),

    /// No payee address could be resolved for the tenant.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// The detached decision task stopped without an answer.
    ///
    /// Reachable only through a panic inside the pipeline or runtime
    /// shutdown; the task is never aborted.
    #[error("decision pipeline halted: {0}")]
    DecisionHalted(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::UnknownTenant(tenant) => {
                tracing::debug!(%tenant, "request for unknown tenant");
                (StatusCode::NOT_FOUND, "tenant not found")
            }
            Self::Provisioning(err) => {
                tracing::error!(tenant = %err.tenant(), error = %err, "payee resolution failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "payment address unavailable",
                )
            }
            Self::DecisionHalted(detail) => {
                tracing::error!(%detail, "decision pipeline halted");
                (StatusCode::INTERNAL_SERVER_ERROR, "decision unavailable")
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Failure of an operator read endpoint.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The ledger store could not serve the read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let Self::Store(err) = &self;
        tracing::error!(error = %err, "ledger read failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "ledger unavailable" })),
        )
            .into_response()
    }
}
