//! Origin classification from a request's declared identity string.
//!
//! Classification is a pure, total function over two disjoint pattern
//! lists: indexer patterns and agent patterns. Matching is case-insensitive
//! substring containment, checked indexer-first, so an identity appearing
//! in both lists resolves to [`Classification::SearchIndexer`].

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Default substring patterns identifying search-engine indexers.
pub const DEFAULT_INDEXER_PATTERNS: &[&str] = &[
    "googlebot",
    "bingbot",
    "duckduckbot",
    "slurp",
    "baiduspider",
    "yandexbot",
    "applebot",
];

/// Default substring patterns identifying autonomous AI agents and
/// model-training crawlers.
pub const DEFAULT_AGENT_PATTERNS: &[&str] = &[
    "gptbot",
    "chatgpt-user",
    "oai-searchbot",
    "claudebot",
    "claude-web",
    "anthropic-ai",
    "ccbot",
    "perplexitybot",
    "bytespider",
    "google-extended",
    "applebot-extended",
    "meta-externalagent",
    "cohere-ai",
];

/// Traffic category derived from the declared identity string.
///
/// `Unknown` is treated as human for access purposes: unmatched traffic
/// passes free, and the recorded classification lets operators tighten the
/// pattern lists later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// A human visitor (explicitly marked by an upstream, e.g. a session).
    Human,
    /// A recognized search-engine indexer; passes free.
    SearchIndexer,
    /// An autonomous AI agent or training crawler; must pay the toll.
    AiAgent,
    /// No pattern matched; treated as human for access purposes.
    Unknown,
}

impl Classification {
    /// Whether this category passes the gate without payment.
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Human | Self::SearchIndexer | Self::Unknown)
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Human => "HUMAN",
            Self::SearchIndexer => "SEARCH_INDEXER",
            Self::AiAgent => "AI_AGENT",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{label}")
    }
}

/// Case-insensitive substring classifier over two disjoint pattern lists.
///
/// Patterns are lowercased once at construction; [`Classifier::classify`]
/// never allocates beyond lowercasing the identity, never fails, and has no
/// side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    indexer_patterns: Vec<String>,
    agent_patterns: Vec<String>,
}

impl Classifier {
    /// Builds a classifier from indexer and agent pattern lists.
    ///
    /// Empty patterns are discarded: an empty substring would match every
    /// identity and turn the gate into a blanket rule.
    #[must_use]
    pub fn new<I, A>(indexer_patterns: I, agent_patterns: A) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        fn lowered<T: IntoIterator>(patterns: T) -> Vec<String>
        where
            T::Item: AsRef<str>,
        {
            patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        }

        Self {
            indexer_patterns: lowered(indexer_patterns),
            agent_patterns: lowered(agent_patterns),
        }
    }

    /// Builds a classifier from the default pattern lists.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_INDEXER_PATTERNS, DEFAULT_AGENT_PATTERNS)
    }

    /// Classifies a declared identity string.
    ///
    /// Total and deterministic: always returns a value, indexer patterns
    /// win over agent patterns, unmatched identities are
    /// [`Classification::Unknown`].
    #[must_use]
    pub fn classify(&self, identity: &str) -> Classification {
        let identity = identity.to_lowercase();
        if self.indexer_patterns.iter().any(|p| identity.contains(p)) {
            return Classification::SearchIndexer;
        }
        if self.agent_patterns.iter().any(|p| identity.contains(p)) {
            return Classification::AiAgent;
        }
        Classification::Unknown
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}
