//! Per-(provider, query) failure breaker.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use super::TtlCache;

/// What tripped the breaker, and when.
#[derive(Debug, Clone)]
pub struct BreakerEntry {
    pub reason: String,
    pub tripped_at: DateTime<Utc>,
}

/// Short-TTL negative cache that mutes a provider for one query after a
/// failure. While an entry is present the orchestrator must not re-invoke
/// that provider for that query.
pub struct FailureBreaker {
    default_ttl: Duration,
    ttl_overrides: HashMap<String, Duration>,
    entries: TtlCache<BreakerEntry>,
}

impl FailureBreaker {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            ttl_overrides: HashMap::new(),
            entries: TtlCache::new(default_ttl),
        }
    }

    /// Per-provider TTL overrides, e.g. a longer mute for a chronically
    /// flaky upstream.
    pub fn with_overrides(mut self, overrides: HashMap<String, Duration>) -> Self {
        self.ttl_overrides = overrides;
        self
    }

    fn key(provider: &str, query_key: &str) -> String {
        format!("{provider}::{query_key}")
    }

    /// Record a failure, muting the (provider, query) pair.
    pub fn trip(&self, provider: &str, query_key: &str, reason: &str) {
        let ttl = self
            .ttl_overrides
            .get(provider)
            .copied()
            .unwrap_or(self.default_ttl);
        let entry = BreakerEntry {
            reason: reason.to_string(),
            tripped_at: Utc::now(),
        };
        info!(provider = provider, reason = reason, "provider muted");
        self.entries
            .set_with_ttl(&Self::key(provider, query_key), entry, ttl);
    }

    /// Return the live breaker entry for the pair, if any.
    pub fn tripped(&self, provider: &str, query_key: &str) -> Option<BreakerEntry> {
        self.entries.get(&Self::key(provider, query_key))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
