//! Per-tenant configuration and the hot-swappable tenant directory.
//!
//! Gating behavior is configured per tenant (a site/operator owning a payee
//! wallet and pricing). Configuration is injected: components receive a
//! [`TenantConfig`] or a [`TenantDirectory`] handle explicitly, never read
//! ambient global state. The directory is safe for concurrent reads and can
//! be swapped live, so pattern and price changes apply without a restart.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, DEFAULT_AGENT_PATTERNS, DEFAULT_INDEXER_PATTERNS};

/// Protocol version advertised in challenges unless a tenant overrides it.
pub const DEFAULT_PROTOCOL_VERSION: &str = "toll/1";

/// Default toll currency.
pub const DEFAULT_CURRENCY: &str = "USDC";

/// Default network tenant wallets are provisioned on.
pub const DEFAULT_NETWORK: &str = "base";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_owned()
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_owned()
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_owned()
}

fn default_indexer_patterns() -> Vec<String> {
    DEFAULT_INDEXER_PATTERNS.iter().map(|&p| p.to_owned()).collect()
}

fn default_agent_patterns() -> Vec<String> {
    DEFAULT_AGENT_PATTERNS.iter().map(|&p| p.to_owned()).collect()
}

/// Gating configuration for one tenant.
///
/// Deserializable from the gateway's TOML configuration; every field except
/// `price` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Toll price per paid request, denominated in [`Self::currency`].
    pub price: Decimal,
    /// Asset symbol the toll is denominated in.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Destination address for toll payments.
    ///
    /// `None` means no address is configured yet; the gateway resolves the
    /// payee from the tenant's provisioned wallet instead.
    #[serde(default)]
    pub pay_to: Option<String>,
    /// Protocol version string advertised in challenges.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Substring patterns classifying search-engine indexers.
    #[serde(default = "default_indexer_patterns")]
    pub indexer_patterns: Vec<String>,
    /// Substring patterns classifying AI agents.
    #[serde(default = "default_agent_patterns")]
    pub agent_patterns: Vec<String>,
    /// Network the tenant's wallet lives on.
    #[serde(default = "default_network")]
    pub network: String,
}

impl TenantConfig {
    /// Creates a configuration with the given price and every other field
    /// at its default.
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            currency: default_currency(),
            pay_to: None,
            protocol_version: default_protocol_version(),
            indexer_patterns: default_indexer_patterns(),
            agent_patterns: default_agent_patterns(),
            network: default_network(),
        }
    }

    /// Sets the payee address.
    #[must_use]
    pub fn with_pay_to(mut self, pay_to: impl Into<String>) -> Self {
        self.pay_to = Some(pay_to.into());
        self
    }

    /// Sets the toll currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Replaces both pattern lists.
    #[must_use]
    pub fn with_patterns<I, A>(mut self, indexer: I, agent: A) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        self.indexer_patterns = indexer.into_iter().map(Into::into).collect();
        self.agent_patterns = agent.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the classifier for this tenant's pattern lists.
    #[must_use]
    pub fn classifier(&self) -> Classifier {
        Classifier::new(&self.indexer_patterns, &self.agent_patterns)
    }
}

/// Hot-swappable directory of tenant configurations, keyed by tenant id.
///
/// Cloning is cheap and clones share one directory: a swap through any
/// handle is visible to every reader. Lookups return `Arc`ed snapshots, so
/// an in-flight request keeps the configuration it started with even if the
/// tenant is swapped mid-request.
#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    inner: Arc<DashMap<String, Arc<TenantConfig>>>,
}

impl TenantDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a tenant's configuration.
    pub fn upsert(&self, tenant_id: impl Into<String>, config: TenantConfig) {
        self.inner.insert(tenant_id.into(), Arc::new(config));
    }

    /// Returns a snapshot of a tenant's configuration.
    #[must_use]
    pub fn get(&self, tenant_id: &str) -> Option<Arc<TenantConfig>> {
        self.inner.get(tenant_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes a tenant. Returns `true` if it existed.
    pub fn remove(&self, tenant_id: &str) -> bool {
        self.inner.remove(tenant_id).is_some()
    }

    /// Replaces the whole directory with `configs`.
    ///
    /// Kept tenants are updated in place before stale ones are dropped, so
    /// a tenant present before and after the swap is always resolvable.
    pub fn replace_all(&self, configs: HashMap<String, TenantConfig>) {
        for (tenant_id, config) in &configs {
            self.upsert(tenant_id.clone(), config.clone());
        }
        self.inner.retain(|tenant_id, _| configs.contains_key(tenant_id));
    }

    /// Number of configured tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no tenants are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the configured tenant ids.
    #[must_use]
    pub fn tenant_ids(&self) -> Vec<String> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }
}
