//! Gateway server configuration.
//!
//! Loads configuration from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax; unresolved references are left as written.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4402
//! database = "tollgate.db"
//!
//! [indexer]
//! url = "https://indexer.base.example/"
//!
//! [custody]
//! url = "https://custody.example/"
//! api_key = "$CUSTODY_API_KEY"
//!
//! [tenants.blog]
//! price = "0.002"
//! pay_to = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
//!
//! [tenants.wiki]
//! price = "0.0005"
//! network = "base-sepolia"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to configuration file (default: `gateway.toml`)
//! - `HOST` — Override server bind address
//! - `PORT` — Override server port
//! - Secrets referenced by `$VAR` in the config file

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tollgate::tenant::TenantConfig;
use url::Url;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4402`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database path for the decision ledger and wallet store
    /// (default: `tollgate.db`).
    #[serde(default = "default_database")]
    pub database: String,

    /// Deadline in seconds for a single payment verification call.
    #[serde(default)]
    pub verify_timeout_secs: Option<u64>,

    /// Chain indexer used to check payment proofs. Without one, every
    /// submitted proof is answered with a retryable denial.
    #[serde(default)]
    pub indexer: Option<IndexerSettings>,

    /// Managed custody service for tenant wallets. Without one, payee
    /// wallets are minted from locally generated keys.
    #[serde(default)]
    pub custody: Option<CustodySettings>,

    /// Gated tenants keyed by tenant id (the first path segment).
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,
}

/// Connection settings for the chain indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Indexer base URL.
    pub url: Url,

    /// Per-request deadline in seconds (default: the client's built-in).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Connection settings for the custody service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodySettings {
    /// Custody base URL.
    pub url: Url,

    /// Bearer token sent with wallet-creation calls. Supports `$VAR` /
    /// `${VAR}` environment variable expansion.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4402
}

fn default_database() -> String {
    "tollgate.db".to_owned()
}

impl GatewayConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `gateway.toml` in the current directory.
    ///
    /// After loading, all string values with `$VAR` / `${VAR}` references
    /// are expanded from the process environment. `HOST` and `PORT` env
    /// vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "gateway.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults apply and the tenant map
    /// starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` references from the process environment.
///
/// Unresolved references are left as-is so that a missing secret shows up
/// verbatim downstream instead of silently becoming an empty string.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        let braced = rest.starts_with('{');

        let (name, tail) = if let Some(inner) = rest.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], &inner[end + 1..]),
                None => {
                    // Unterminated brace: keep the remainder verbatim.
                    out.push('$');
                    out.push_str(rest);
                    return out;
                }
            }
        } else {
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            (&rest[..end], &rest[end..])
        };

        if name.is_empty() {
            out.push('$');
            if braced {
                out.push_str("{}");
            }
        } else if let Ok(value) = std::env::var(name) {
            out.push_str(&value);
        } else if braced {
            out.push_str("${");
            out.push_str(name);
            out.push('}');
        } else {
            out.push('$');
            out.push_str(name);
        }

        rest = tail;
    }

    out.push_str(rest);
    out
}
