//! Tower middleware that puts the toll gate in front of protected routes.
//!
//! The layer extracts the transport-neutral request envelope (identity,
//! path, payment header), runs it through [`Gateway::decide`], and either
//! forwards to the wrapped service or answers `402 Payment Required`
//! itself. Every response leaving the gate carries the correlation id
//! header for ledger round-trips.
//!
//! Tenant selection is per layer: [`TollGate::for_tenant`] pins one tenant
//! (embedding the gate inside that tenant's own router), while
//! [`TollGate::by_path_prefix`] reads the tenant from the first path
//! segment so tenants added to the directory at runtime are gated without
//! re-routing.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use http::header;
use tollgate::request::IncomingRequest;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use crate::gate::Gateway;
use crate::headers::PAYMENT_HEADER;

/// Entry point for building gate layers over one shared [`Gateway`].
#[derive(Debug, Clone)]
pub struct TollGate {
    gateway: Arc<Gateway>,
}

impl TollGate {
    /// Wraps an assembled gateway.
    #[must_use]
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// A layer gating one fixed tenant.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: impl Into<String>) -> TollGateLayer {
        TollGateLayer {
            gateway: Arc::clone(&self.gateway),
            selector: TenantSelector::Fixed(Arc::from(tenant_id.into())),
        }
    }

    /// A layer that reads the tenant from the first path segment
    /// (`/{tenant}/...`).
    ///
    /// Pair it with a catch-all route: tenants added to the directory at
    /// runtime take effect on the next request.
    #[must_use]
    pub fn by_path_prefix(&self) -> TollGateLayer {
        TollGateLayer {
            gateway: Arc::clone(&self.gateway),
            selector: TenantSelector::PathPrefix,
        }
    }
}

/// How a layer decides which tenant a request belongs to.
#[derive(Debug, Clone)]
enum TenantSelector {
    Fixed(Arc<str>),
    PathPrefix,
}

impl TenantSelector {
    /// Resolves `(tenant_id, resource_path)` for a request path.
    fn resolve<'a>(&'a self, path: &'a str) -> (&'a str, &'a str) {
        match self {
            Self::Fixed(tenant) => (tenant, path),
            Self::PathPrefix => split_first_segment(path),
        }
    }
}

/// Splits `/{tenant}/rest` into `("tenant", "/rest")`.
///
/// A path without a second segment maps to the tenant root `/`; an empty
/// path yields an empty tenant id, which no directory resolves.
fn split_first_segment(path: &str) -> (&str, &str) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => (trimmed, "/"),
    }
}

/// Gate layer for one tenant selection strategy.
#[derive(Debug, Clone)]
pub struct TollGateLayer {
    gateway: Arc<Gateway>,
    selector: TenantSelector,
}

impl<S> Layer<S> for TollGateLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = TollGateService;

    fn layer(&self, inner: S) -> Self::Service {
        TollGateService {
            gateway: Arc::clone(&self.gateway),
            selector: self.selector.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// The gate in front of a wrapped service.
#[derive(Clone)]
pub struct TollGateService {
    gateway: Arc<Gateway>,
    selector: TenantSelector,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl std::fmt::Debug for TollGateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TollGateService")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl Service<Request> for TollGateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gateway = Arc::clone(&self.gateway);
        let selector = self.selector.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let envelope = build_envelope(&selector, &req);
            let gated = match gateway.decide(envelope).await {
                Ok(gated) => gated,
                Err(err) => return Ok(err.into_response()),
            };

            if let Some(response) = gated.blocking_response() {
                return Ok(response);
            }

            let mut response = inner.call(req).await?;
            gated.stamp(&mut response);
            Ok(response)
        })
    }
}

/// Builds the transport-neutral envelope for one HTTP request.
fn build_envelope(selector: &TenantSelector, req: &Request) -> IncomingRequest {
    let (tenant_id, resource) = selector.resolve(req.uri().path());
    let identity = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let mut envelope = IncomingRequest::new(tenant_id, identity, resource);
    if let Some(proof) = req
        .headers()
        .get(PAYMENT_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        envelope = envelope.with_proof_header(proof);
    }
    envelope
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use http::StatusCode;
    use tollgate::challenge::{MSG_PAYMENT_INVALID, MSG_PAYMENT_REQUIRED, MSG_VERIFICATION_RETRY};
    use tollgate::ledger::{ActionKind, LedgerQuery};
    use tollgate::tenant::TenantConfig;
    use tower::ServiceExt;

    use super::*;
    use crate::handlers::{AdminState, admin_router};
    use crate::headers::{CORRELATION_HEADER, PROTOCOL_HEADER};
    use crate::testutil::{PAYEE, TENANT, paid_record, rig_with, tx_ref};

    fn protected_app(gate: &TollGate) -> Router {
        Router::new()
            .route("/post/1", get(|| async { "the article" }))
            .layer(gate.for_tenant(TENANT))
    }

    async fn send(app: &Router, identity: &str, proof: Option<String>) -> http::Response<Body> {
        let mut builder = http::Request::builder()
            .uri("/post/1")
            .header(header::USER_AGENT, identity);
        if let Some(proof) = proof {
            builder = builder.header(PAYMENT_HEADER, proof);
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: http::Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn search_indexer_reaches_the_content() {
        let rig = rig_with([]);
        let ledger = Arc::clone(&rig.ledger);
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = protected_app(&gate);

        let response = send(
            &app,
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"the article");

        let page = ledger
            .query(LedgerQuery {
                kind: Some(ActionKind::AllowedVisit),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[tokio::test]
    async fn agent_without_proof_gets_the_toll_terms() {
        let rig = rig_with([]);
        let ledger = Arc::clone(&rig.ledger);
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = protected_app(&gate);

        let response = send(&app, "GPTBot/1.2", None).await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            response.headers().get(PROTOCOL_HEADER).unwrap(),
            &"toll/1"
        );
        let body = json_body(response).await;
        assert_eq!(body["error"], "Payment Required");
        assert_eq!(body["message"], MSG_PAYMENT_REQUIRED);
        assert_eq!(body["pay_to"], PAYEE);
        assert_eq!(body["currency"], "USDC");
        assert_eq!(body["price"], "0.002");

        let page = ledger
            .query(LedgerQuery {
                kind: Some(ActionKind::BlockedPendingPayment),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[tokio::test]
    async fn paid_agent_reaches_the_content() {
        let tx = tx_ref('a');
        let rig = rig_with([paid_record(&tx, "2000")]);
        let ledger = Arc::clone(&rig.ledger);
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = protected_app(&gate);

        let response = send(&app, "GPTBot/1.2", Some(format!("Toll {tx}"))).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"the article");

        let page = ledger
            .query(LedgerQuery {
                kind: Some(ActionKind::PaymentAccepted),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].amount, "0.002".parse().unwrap());
        assert_eq!(page.entries[0].details["txRef"], tx);
        assert_eq!(page.entries[0].actor_id, "GPTBot/1.2");
    }

    #[tokio::test]
    async fn underpaid_agent_is_denied_with_a_generic_body() {
        let tx = tx_ref('b');
        let rig = rig_with([paid_record(&tx, "100")]);
        let ledger = Arc::clone(&rig.ledger);
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = protected_app(&gate);

        let response = send(&app, "GPTBot/1.2", Some(format!("Toll {tx}"))).await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        // The body never says which check failed, only that payment did
        // not go through.
        assert_eq!(body["message"], MSG_PAYMENT_INVALID);

        let page = ledger
            .query(LedgerQuery {
                kind: Some(ActionKind::PaymentRejected),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].details["reason"], "INSUFFICIENT");
    }

    #[tokio::test]
    async fn unknown_reference_asks_the_client_to_retry() {
        let rig = rig_with([]);
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = protected_app(&gate);

        let response = send(
            &app,
            "GPTBot/1.2",
            Some(format!("Toll {}", tx_ref('c'))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["message"], MSG_VERIFICATION_RETRY);
    }

    #[tokio::test]
    async fn replayed_proof_is_rejected_the_second_time() {
        let tx = tx_ref('d');
        let rig = rig_with([paid_record(&tx, "2000")]);
        let ledger = Arc::clone(&rig.ledger);
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = protected_app(&gate);

        let first = send(&app, "GPTBot/1.2", Some(format!("Toll {tx}"))).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = send(&app, "GPTBot/1.2", Some(format!("Toll {tx}"))).await;
        assert_eq!(second.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(second).await;
        assert_eq!(body["message"], MSG_PAYMENT_INVALID);

        let accepted = ledger
            .query(LedgerQuery {
                kind: Some(ActionKind::PaymentAccepted),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(accepted.entries.len(), 1);

        let rejected = ledger
            .query(LedgerQuery {
                kind: Some(ActionKind::PaymentRejected),
                ..LedgerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(rejected.entries.len(), 1);
        assert_eq!(rejected.entries[0].details["reason"], "REPLAYED");
    }

    #[tokio::test]
    async fn correlation_id_round_trips_through_the_ledger() {
        let tx = tx_ref('e');
        let rig = rig_with([paid_record(&tx, "2000")]);
        let ledger = Arc::clone(&rig.ledger);
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = protected_app(&gate);

        let response = send(&app, "GPTBot/1.2", Some(format!("Toll {tx}"))).await;
        let correlation = response
            .headers()
            .get(CORRELATION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();

        let admin = admin_router(AdminState { ledger });
        let lookup = admin
            .oneshot(
                http::Request::builder()
                    .uri(format!("/ledger/entries/{correlation}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(lookup.status(), StatusCode::OK);
        let trail = json_body(lookup).await;
        let entries = trail.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["correlationId"], correlation);
        assert_eq!(entries[0]["actionKind"], "PAYMENT_ACCEPTED");
    }

    #[tokio::test]
    async fn path_prefix_layer_resolves_tenants_at_request_time() {
        let rig = rig_with([]);
        let directory = rig.directory.clone();
        let gate = TollGate::new(Arc::new(rig.gateway));
        let app = Router::new()
            .fallback(|| async { "content" })
            .layer(gate.by_path_prefix());

        let known = app
            .clone()
            .oneshot(
                http::Request::builder()
                    .uri(format!("/{TENANT}/post/1"))
                    .header(header::USER_AGENT, "GPTBot/1.2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(known.status(), StatusCode::PAYMENT_REQUIRED);

        let unknown = app
            .clone()
            .oneshot(
                http::Request::builder()
                    .uri("/wiki/page")
                    .header(header::USER_AGENT, "GPTBot/1.2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        // Adding the tenant to the live directory gates it immediately,
        // with no route changes.
        directory.upsert(
            "wiki",
            TenantConfig::new("0.001".parse().unwrap()).with_pay_to(PAYEE),
        );
        let added = app
            .clone()
            .oneshot(
                http::Request::builder()
                    .uri("/wiki/page")
                    .header(header::USER_AGENT, "GPTBot/1.2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(added.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(added).await;
        assert_eq!(body["price"], "0.001");
    }

    #[test]
    fn first_segment_split_covers_the_edge_shapes() {
        assert_eq!(split_first_segment("/blog/post/1"), ("blog", "/post/1"));
        assert_eq!(split_first_segment("/blog"), ("blog", "/"));
        assert_eq!(split_first_segment("/"), ("", "/"));
        assert_eq!(split_first_segment(""), ("", "/"));
    }
}
