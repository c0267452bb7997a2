//! Types for the fan-out orchestrator.

use std::collections::HashMap;

use serde::Serialize;

use crate::provider::Candidate;

/// Per-provider counters for one fan-out.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ProviderStats {
    /// Candidates returned (from cache or network).
    pub fetched: u32,
    /// Candidates surviving the merge dedup.
    pub deduped: u32,
    /// Candidates that made the final selection. Filled in by the service.
    pub finalized: u32,
    /// Failed calls (after retries).
    pub failed: u32,
    /// Retries performed.
    pub retries: u32,
    /// Calls that hit the timeout.
    pub timeouts: u32,
    /// Calls skipped because the breaker was tripped.
    pub skipped: u32,
}

/// Merged outcome of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanoutResult {
    /// Deduplicated candidates in fan-out order.
    pub candidates: Vec<Candidate>,
    /// Per-provider stats.
    pub stats: HashMap<String, ProviderStats>,
    /// Providers that failed this round (name -> reason).
    pub provider_errors: HashMap<String, String>,
    /// Total fan-out wall clock in milliseconds.
    pub duration_ms: u64,
}

impl FanoutResult {
    /// Render the per-provider stats table logged after a fan-out.
    pub fn stats_table(&self) -> String {
        let header = format!(
            "{:12} {:>7} {:>7} {:>7} {:>7} {:>8} {:>7}",
            "provider", "fetched", "deduped", "failed", "retries", "timeouts", "skipped"
        );
        let mut lines = vec![header];
        let mut providers: Vec<&String> = self.stats.keys().collect();
        providers.sort();
        for provider in providers {
            let s = &self.stats[provider];
            lines.push(format!(
                "{:12} {:>7} {:>7} {:>7} {:>7} {:>8} {:>7}",
                provider, s.fetched, s.deduped, s.failed, s.retries, s.timeouts, s.skipped
            ));
        }
        lines.join("\n")
    }
}
