//! Known payment network metadata.
//!
//! Tenant configuration names networks by their human-readable name
//! (e.g. `"base"`); this module maps those names to CAIP-2 chain
//! identifiers so configuration loading can validate them and logs can
//! carry the canonical id. Transaction records carry their own asset
//! scale, so nothing here is consulted on the verification hot path.

/// A known network with its CAIP-2 chain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Human-readable network name used in tenant configuration.
    pub name: &'static str,
    /// CAIP-2 chain identifier (e.g. `eip155:8453`).
    pub chain_id: &'static str,
}

/// Networks the gateway ships metadata for.
///
/// An unlisted network is not an error (custody and the indexer decide
/// what they support), but configuration loading warns about it.
pub const KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "base",
        chain_id: "eip155:8453",
    },
    NetworkInfo {
        name: "base-sepolia",
        chain_id: "eip155:84532",
    },
    NetworkInfo {
        name: "ethereum",
        chain_id: "eip155:1",
    },
    NetworkInfo {
        name: "optimism",
        chain_id: "eip155:10",
    },
    NetworkInfo {
        name: "arbitrum",
        chain_id: "eip155:42161",
    },
    NetworkInfo {
        name: "polygon",
        chain_id: "eip155:137",
    },
];

/// Looks up a known network by name, case-insensitively.
#[must_use]
pub fn find_network(name: &str) -> Option<&'static NetworkInfo> {
    KNOWN_NETWORKS
        .iter()
        .find(|info| info.name.eq_ignore_ascii_case(name.trim()))
}
