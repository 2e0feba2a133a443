//! Axum route handlers for the operator surface.
//!
//! Read-only endpoints over the decision ledger plus a liveness probe.
//! Writes happen only through the gate; nothing here mutates state.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::json;
use tollgate::ledger::{LedgerEntry, LedgerPage, LedgerQuery};
use tollgate_store::RetryingLedger;

use crate::error::AdminError;

/// Shared state for the operator endpoints.
#[derive(Debug, Clone)]
pub struct AdminState {
    /// Ledger handle used for reads.
    pub ledger: Arc<RetryingLedger>,
}

/// `GET /health` — liveness probe with the crate version.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /ledger/entries` — filtered, newest-first page of decisions.
///
/// Query parameters: `kind` (action kind label), `limit`, and `before`
/// (cursor from the previous page's `nextBefore`).
///
/// # Errors
///
/// Returns 500 when the ledger store cannot serve the read.
pub async fn get_ledger_entries(
    State(state): State<AdminState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerPage>, AdminError> {
    Ok(Json(state.ledger.query(query).await?))
}

/// `GET /ledger/entries/{correlation_id}` — the full decision trail of
/// one request, oldest first.
///
/// # Errors
///
/// Returns 500 when the ledger store cannot serve the read.
pub async fn get_ledger_trail(
    State(state): State<AdminState>,
    Path(correlation_id): Path<String>,
) -> Result<Json<Vec<LedgerEntry>>, AdminError> {
    Ok(Json(state.ledger.find_by_correlation(&correlation_id).await?))
}

/// Builds the operator router.
///
/// Endpoints:
/// - `GET /health` — liveness probe
/// - `GET /ledger/entries` — query the decision ledger
/// - `GET /ledger/entries/{correlation_id}` — one request's trail
pub fn admin_router(state: AdminState) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(get_health))
        .route("/ledger/entries", axum::routing::get(get_ledger_entries))
        .route(
            "/ledger/entries/{correlation_id}",
            axum::routing::get(get_ledger_trail),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::StatusCode;
    use tollgate::ledger::{ActionKind, NewLedgerEntry};
    use tollgate_store::GatewayStore;
    use tower::ServiceExt;

    use super::*;

    fn ledger() -> Arc<RetryingLedger> {
        let store = GatewayStore::open_in_memory().expect("in-memory store");
        Arc::new(RetryingLedger::spawn(Arc::new(store.ledger())))
    }

    async fn get(router: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .clone()
            .oneshot(
                http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok_and_version() {
        let router = admin_router(AdminState { ledger: ledger() });
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(!body["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_filter_by_kind_and_paginate() {
        let ledger = ledger();
        for i in 0..3 {
            ledger
                .append_durable(NewLedgerEntry::new(
                    format!("corr-{i}"),
                    "Googlebot/2.1",
                    ActionKind::AllowedVisit,
                ))
                .await;
        }
        ledger
            .append_durable(NewLedgerEntry::new(
                "corr-paid",
                "GPTBot/1.2",
                ActionKind::PaymentAccepted,
            ))
            .await;

        let router = admin_router(AdminState {
            ledger: Arc::clone(&ledger),
        });

        let (status, body) = get(&router, "/ledger/entries?kind=ALLOWED_VISIT&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e["actionKind"] == "ALLOWED_VISIT"));
        let cursor = body["nextBefore"].as_i64().unwrap();

        let (status, body) = get(
            &router,
            &format!("/ledger/entries?kind=ALLOWED_VISIT&limit=2&before={cursor}"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
        assert!(body["nextBefore"].is_null());
    }

    #[tokio::test]
    async fn trail_returns_every_entry_for_a_correlation() {
        let ledger = ledger();
        ledger
            .append_durable(NewLedgerEntry::new(
                "corr-x",
                "GPTBot/1.2",
                ActionKind::BlockedPendingPayment,
            ))
            .await;
        ledger
            .append_durable(NewLedgerEntry::new(
                "corr-x",
                "GPTBot/1.2",
                ActionKind::PaymentAccepted,
            ))
            .await;

        let router = admin_router(AdminState { ledger });
        let (status, body) = get(&router, "/ledger/entries/corr-x").await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["actionKind"], "BLOCKED_PENDING_PAYMENT");
        assert_eq!(entries[1]["actionKind"], "PAYMENT_ACCEPTED");
    }

    #[tokio::test]
    async fn unknown_kind_is_a_client_error() {
        let router = admin_router(AdminState { ledger: ledger() });
        let (status, _body) = get(&router, "/ledger/entries?kind=BOGUS").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
