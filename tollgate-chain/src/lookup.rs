//! HTTP client for the external chain indexer.
//!
//! The verifier never trusts a submitted proof; it resolves the reference
//! through an indexer REST API (`GET /v1/tx/{txRef}`) into a
//! [`TxRecord`]. This client owns the transport concerns (endpoint
//! construction, auth headers, the per-request deadline) and maps
//! transport failures onto the retryable [`LookupError`] taxonomy the core
//! verifier consumes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tollgate::chain::{LookupError, TxLookup, TxRecord};
use url::Url;

/// Default bound on a single indexer query.
///
/// A slow chain query must never stall the gateway; callers can tighten or
/// relax this with [`IndexerClient::with_timeout`].
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the indexer HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum IndexerClientError {
    /// Failed to parse or construct an endpoint URL.
    #[error("Invalid indexer URL ({context}): {source}")]
    UrlParse {
        /// Human-readable identifier of the operation that failed.
        context: &'static str,
        /// Underlying URL parsing error.
        #[source]
        source: url::ParseError,
    },

    /// HTTP request failed (network error, timeout, etc.).
    #[error("HTTP request failed ({context}): {source}")]
    Http {
        /// Human-readable identifier of the operation that failed.
        context: &'static str,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Failed to deserialize the response body as JSON.
    #[error("Failed to deserialize response ({context}): {source}")]
    JsonDeserialization {
        /// Human-readable identifier of the operation that failed.
        context: &'static str,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The indexer returned a non-success HTTP status code.
    #[error("HTTP status error ({context}): {status}: {body}")]
    HttpStatus {
        /// Human-readable identifier of the operation that failed.
        context: &'static str,
        /// The HTTP status code returned.
        status: StatusCode,
        /// The response body, for diagnostics.
        body: String,
    },

    /// Failed to read the response body of a non-success response.
    #[error("Failed to read response body ({context}): {source}")]
    ResponseBodyRead {
        /// Human-readable identifier of the operation that failed.
        context: &'static str,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// Client for a chain indexer's transaction API.
///
/// Endpoint URLs are derived from the base URL once at construction; every
/// query carries the configured headers and deadline.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    client: Client,
    base_url: Url,
    tx_url: Url,
    headers: HeaderMap,
    timeout: Duration,
}

impl IndexerClient {
    /// Creates a client for the indexer at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerClientError::UrlParse`] if the transaction endpoint
    /// cannot be derived from the base URL.
    pub fn try_new(base_url: Url) -> Result<Self, IndexerClientError> {
        let tx_url = base_url
            .join("./v1/tx/")
            .map_err(|e| IndexerClientError::UrlParse {
                context: "Failed to derive transaction endpoint",
                source: e,
            })?;

        Ok(Self {
            client: Client::new(),
            base_url,
            tx_url,
            headers: HeaderMap::new(),
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        })
    }

    /// Sets headers sent with every request (e.g. an API key).
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The indexer base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The per-request deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches the transaction record for `tx_ref`.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexerClientError`] describing the transport or
    /// decoding failure; a `404` surfaces as
    /// [`IndexerClientError::HttpStatus`].
    pub async fn transaction(&self, tx_ref: &str) -> Result<TxRecord, IndexerClientError> {
        let context = "GET /v1/tx/{txRef}";
        let url = self
            .tx_url
            .join(tx_ref)
            .map_err(|e| IndexerClientError::UrlParse {
                context: "Failed to build transaction URL",
                source: e,
            })?;

        let mut req = self.client.get(url).timeout(self.timeout);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        let response = req
            .send()
            .await
            .map_err(|e| IndexerClientError::Http { context, source: e })?;

        if response.status() == StatusCode::OK {
            response
                .json::<TxRecord>()
                .await
                .map_err(|e| IndexerClientError::JsonDeserialization { context, source: e })
        } else {
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| IndexerClientError::ResponseBodyRead { context, source: e })?;
            Err(IndexerClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

#[async_trait]
impl TxLookup for IndexerClient {
    async fn lookup(&self, tx_ref: &str) -> Result<TxRecord, LookupError> {
        match self.transaction(tx_ref).await {
            Ok(record) => Ok(record),
            Err(IndexerClientError::HttpStatus { status, .. })
                if status == StatusCode::NOT_FOUND =>
            {
                Err(LookupError::NotFound(tx_ref.to_owned()))
            }
            Err(IndexerClientError::Http { source, .. }) if source.is_timeout() => {
                Err(LookupError::TimedOut(self.timeout))
            }
            Err(err) => Err(LookupError::Upstream(err.to_string())),
        }
    }
}

/// Converts a string URL into an `IndexerClient`, normalizing the trailing
/// slash so endpoint joins behave the same for `…/api` and `…/api/`.
impl TryFrom<&str> for IndexerClient {
    type Error = IndexerClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| IndexerClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Converts a String URL into an `IndexerClient`.
impl TryFrom<String> for IndexerClient {
    type Error = IndexerClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}
