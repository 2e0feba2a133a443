//! Standalone tollgate gateway server.
//!
//! Serves every configured tenant behind the toll gate: the first path
//! segment selects the tenant, free traffic passes through, AI agents are
//! challenged with payment terms, and verified payments are claimed and
//! recorded in the SQLite decision ledger. Operator read endpoints
//! (`/health`, `/ledger/entries`) are mounted beside the gated routes.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (gateway.toml in the current directory)
//! cargo run -p tollgate-gateway --release
//!
//! # Run with a custom config path
//! CONFIG=/etc/tollgate/gateway.toml cargo run -p tollgate-gateway
//!
//! # Configure logging level
//! RUST_LOG=tollgate_http=debug cargo run -p tollgate-gateway
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to TOML configuration file (default: `gateway.toml`)
//! - `HOST` — Override bind address (default: `0.0.0.0`)
//! - `PORT` — Override port (default: `4402`)
//! - `RUST_LOG` — Log level filter (default: `info`)
//!
//! # Signals
//!
//! - `SIGHUP` re-reads the config file and swaps the tenant directory in
//!   place; connections, clients, and the ledger are untouched.
//! - `SIGTERM` / Ctrl-C drain connections and shut down.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::http::Method;
use tollgate::chain::{LookupError, TxLookup, TxRecord};
use tollgate::tenant::{TenantConfig, TenantDirectory};
use tollgate::verify::PaymentVerifier;
use tollgate::wallet::CustodyClient;
use tollgate_chain::networks::find_network;
use tollgate_chain::{CustodyApiClient, IndexerClient, UnconfiguredCustody, WalletProvisioner};
use tollgate_http::{AdminState, Gateway, TollGate, admin_router};
use tollgate_store::{GatewayStore, RetryingLedger};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod config;

use config::GatewayConfig;

#[tokio::main]
async fn main() {
    // .env first so RUST_LOG and config secrets are visible below.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("gateway failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        tenants = config.tenants.len(),
        "loaded configuration"
    );

    if config.tenants.is_empty() {
        tracing::warn!("no tenants configured; every gated path responds 404 until a reload adds one");
    }
    log_tenant_networks(&config.tenants);

    let store = GatewayStore::open(&config.database)?;
    let ledger = Arc::new(RetryingLedger::spawn(Arc::new(store.ledger())));
    let wallets = Arc::new(store.wallets());

    let custody: Arc<dyn CustodyClient> = match &config.custody {
        Some(settings) => {
            let mut client = CustodyApiClient::try_new(settings.url.clone())?;
            match settings.api_key.as_deref() {
                Some(key) if key.starts_with('$') => {
                    tracing::warn!(
                        "custody api_key not resolved (missing env var?); sending no credential"
                    );
                }
                Some(key) => client = client.with_api_key(key),
                None => {}
            }
            tracing::info!(url = %settings.url, "using managed custody for tenant wallets");
            Arc::new(client)
        }
        None => {
            tracing::info!("custody not configured; tenant wallets use locally generated keys");
            Arc::new(UnconfiguredCustody)
        }
    };
    let provisioner = Arc::new(WalletProvisioner::new(custody, wallets));

    let verifier = match &config.indexer {
        Some(settings) => {
            let mut client = IndexerClient::try_new(settings.url.clone())?;
            if let Some(secs) = settings.timeout_secs {
                client = client.with_timeout(Duration::from_secs(secs));
            }
            tracing::info!(url = %settings.url, "verifying payments against the chain indexer");
            PaymentVerifier::new(Arc::new(client))
        }
        None => {
            tracing::warn!("no indexer configured; payment proofs will be denied as retryable");
            PaymentVerifier::new(Arc::new(OfflineLookup))
        }
    };

    let directory = TenantDirectory::new();
    directory.replace_all(config.tenants.clone());

    let mut gateway = Gateway::new(directory.clone(), provisioner, verifier, Arc::clone(&ledger));
    if let Some(secs) = config.verify_timeout_secs {
        gateway = gateway.with_verify_timeout(Duration::from_secs(secs));
    }
    let gate = TollGate::new(Arc::new(gateway));

    #[cfg(unix)]
    spawn_config_reload(directory.clone());

    let gated = Router::new()
        .fallback(origin_placeholder)
        .layer(gate.by_path_prefix());

    let app = Router::new()
        .merge(admin_router(AdminState { ledger }))
        .merge(gated)
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("tollgate listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway shut down gracefully");
    Ok(())
}

/// Stand-in origin for the standalone binary.
///
/// Deployments embed the gate layer in front of their own routers or
/// proxies; the standalone gateway answers passed-through requests with a
/// fixed body so the toll flow can be exercised end to end.
async fn origin_placeholder() -> &'static str {
    "toll cleared: configure an origin to serve real content here\n"
}

/// Lookup used when no indexer is configured.
///
/// Every proof fails upstream, which the gate maps to a retryable denial
/// rather than a grant or a hard rejection.
#[derive(Debug, Clone, Copy)]
struct OfflineLookup;

#[async_trait]
impl TxLookup for OfflineLookup {
    async fn lookup(&self, _tx_ref: &str) -> Result<TxRecord, LookupError> {
        Err(LookupError::Upstream("no chain indexer configured".to_owned()))
    }
}

/// Reloads the tenant directory when the process receives `SIGHUP`.
///
/// Only tenants are swapped; bind address, database, and upstream clients
/// keep their boot-time values. A failed reload keeps the running set.
#[cfg(unix)]
fn spawn_config_reload(directory: TenantDirectory) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "SIGHUP handler unavailable; config reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            match GatewayConfig::load() {
                Ok(fresh) => {
                    log_tenant_networks(&fresh.tenants);
                    let count = fresh.tenants.len();
                    directory.replace_all(fresh.tenants);
                    tracing::info!(tenants = count, "tenant directory reloaded");
                }
                Err(err) => {
                    tracing::error!(error = %err, "config reload failed; keeping the current tenants");
                }
            }
        }
    });
}

/// Logs each tenant's canonical chain id and flags unrecognized networks.
fn log_tenant_networks(tenants: &HashMap<String, TenantConfig>) {
    for (tenant, tenant_config) in tenants {
        match find_network(&tenant_config.network) {
            Some(info) => tracing::debug!(
                %tenant,
                network = info.name,
                chain_id = info.chain_id,
                "tenant network resolved"
            ),
            None => tracing::warn!(
                %tenant,
                network = %tenant_config.network,
                "tenant is configured on an unrecognized network"
            ),
        }
    }
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("received Ctrl-C, shutting down");
    }
}
