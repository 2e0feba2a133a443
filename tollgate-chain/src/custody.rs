//! HTTP client for the managed wallet custody service.
//!
//! Custody exposes `POST /v1/wallets`; the response is decoded into the
//! typed [`ManagedWallet`] contract and every failure mode is mapped onto
//! a [`CustodyError`] variant, all of which the provisioner treats as
//! "fall back to a local key". There is no shape-sniffing: a body that
//! does not decode into the contract is [`CustodyError::Malformed`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tollgate::wallet::{CustodyClient, CustodyError, ManagedWallet};
use url::Url;

/// Default bound on a custody wallet-creation call.
pub const DEFAULT_CUSTODY_TIMEOUT: Duration = Duration::from_secs(5);

/// Wallet creation payload sent to custody.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateWalletRequest<'a> {
    tenant_id: &'a str,
    network: &'a str,
}

/// Client for the custody service's wallet API.
#[derive(Debug, Clone)]
pub struct CustodyApiClient {
    client: Client,
    base_url: Url,
    wallets_url: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl CustodyApiClient {
    /// Creates a client for the custody service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`url::ParseError`] if the wallets endpoint
    /// cannot be derived from the base URL.
    pub fn try_new(base_url: Url) -> Result<Self, url::ParseError> {
        let wallets_url = base_url.join("./v1/wallets")?;

        Ok(Self {
            client: Client::new(),
            base_url,
            wallets_url,
            api_key: None,
            timeout: DEFAULT_CUSTODY_TIMEOUT,
        })
    }

    /// Sets the bearer token sent with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The custody base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The per-request deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CustodyClient for CustodyApiClient {
    async fn create_wallet(
        &self,
        tenant_id: &str,
        network: &str,
    ) -> Result<ManagedWallet, CustodyError> {
        let payload = CreateWalletRequest { tenant_id, network };

        let mut req = self
            .client
            .post(self.wallets_url.clone())
            .json(&payload)
            .timeout(self.timeout);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                CustodyError::TimedOut
            } else {
                CustodyError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CustodyError::QuotaExhausted);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CustodyError::Rejected(format!("{status}: {body}")));
        }

        response
            .json::<ManagedWallet>()
            .await
            .map_err(|e| CustodyError::Malformed(e.to_string()))
    }
}

/// Converts a string URL into a `CustodyApiClient`, normalizing the
/// trailing slash.
impl TryFrom<&str> for CustodyApiClient {
    type Error = url::ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized)?;
        Self::try_new(url)
    }
}

/// Converts a String URL into a `CustodyApiClient`.
impl TryFrom<String> for CustodyApiClient {
    type Error = url::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Custody client for deployments that run without a custody service.
///
/// Every request is refused with [`CustodyError::Rejected`], so the
/// provisioner always takes the local-key fallback and tenants still end
/// up with a persisted payee address.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredCustody;

#[async_trait]
impl CustodyClient for UnconfiguredCustody {
    async fn create_wallet(
        &self,
        _tenant_id: &str,
        _network: &str,
    ) -> Result<ManagedWallet, CustodyError> {
        Err(CustodyError::Rejected(
            "custody service not configured".to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TENANT: &str = "acme-docs";

    fn client_for(server: &MockServer) -> CustodyApiClient {
        CustodyApiClient::try_from(server.uri()).unwrap()
    }

    #[tokio::test]
    async fn creates_a_managed_wallet() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/wallets"))
            .and(body_json(serde_json::json!({
                "tenantId": TENANT,
                "network": "base",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "address": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "network": "base",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let wallet = client.create_wallet(TENANT, "base").await.unwrap();

        assert_eq!(wallet.address, "0x209693Bc6afc0C5328bA36FaF03C514EF312287C");
        assert_eq!(wallet.network, "base");
    }

    #[tokio::test]
    async fn quota_response_maps_to_quota_exhausted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/wallets"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.create_wallet(TENANT, "base").await.unwrap_err();

        assert_eq!(err, CustodyError::QuotaExhausted);
    }

    #[tokio::test]
    async fn undecodable_body_maps_to_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/wallets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "walletId": "w-123" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.create_wallet(TENANT, "base").await.unwrap_err();

        assert!(matches!(err, CustodyError::Malformed(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/wallets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("out of keys"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.create_wallet(TENANT, "base").await.unwrap_err();

        assert!(matches!(err, CustodyError::Rejected(reason) if reason.contains("out of keys")));
    }

    #[tokio::test]
    async fn slow_custody_maps_to_timed_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/wallets"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(250)))
            .mount(&server)
            .await;

        let client = client_for(&server).with_timeout(Duration::from_millis(50));
        let err = client.create_wallet(TENANT, "base").await.unwrap_err();

        assert_eq!(err, CustodyError::TimedOut);
    }

    #[tokio::test]
    async fn sends_bearer_auth_when_configured() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/wallets"))
            .and(header("authorization", "Bearer custody-key"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "address": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "network": "base",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).with_api_key("custody-key");

        assert!(client.create_wallet(TENANT, "base").await.is_ok());
    }
}
