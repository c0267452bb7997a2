//! Bounded-concurrency provider fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::cache::{FailureBreaker, TtlCache};
use crate::config::EngineConfig;
use crate::metrics;
use crate::provider::{Candidate, ProviderError, ProviderRegistry, SubtitleProvider};
use crate::query::SearchQuery;
use crate::ranker::dedupe_candidates;

use super::types::{FanoutResult, ProviderStats};
use super::IntervalLimiter;

/// Outcome of one provider's calls within a fan-out.
enum CallOutcome {
    Hit(Vec<Candidate>),
    Failed(String),
    TimedOut,
}

/// Issues concurrent search calls to all enabled providers for one query,
/// respecting the global and per-provider concurrency ceilings, per-provider
/// rate limits, timeouts and the retry budget. Total wall clock is bounded
/// by the slowest non-skipped provider, not the sum.
pub struct FanoutOrchestrator {
    registry: ProviderRegistry,
    config: EngineConfig,
    provider_cache: TtlCache<Vec<Candidate>>,
    breaker: FailureBreaker,
    limiter: IntervalLimiter,
    global_limit: Arc<Semaphore>,
    provider_limits: HashMap<String, Arc<Semaphore>>,
}

impl FanoutOrchestrator {
    pub fn new(registry: ProviderRegistry, config: EngineConfig) -> Self {
        let provider_cache = TtlCache::new(Duration::from_secs(config.cache.provider_ttl_secs));

        let breaker_overrides: HashMap<String, Duration> = config
            .providers
            .iter()
            .filter_map(|(id, p)| {
                p.breaker_ttl_secs
                    .map(|secs| (id.clone(), Duration::from_secs(secs)))
            })
            .collect();
        let breaker = FailureBreaker::new(Duration::from_secs(config.cache.breaker_ttl_secs))
            .with_overrides(breaker_overrides);

        let intervals: HashMap<String, Duration> = config
            .providers
            .iter()
            .map(|(id, p)| (id.clone(), Duration::from_millis(p.min_interval_ms)))
            .collect();
        let limiter = IntervalLimiter::new(intervals);

        let global_limit = Arc::new(Semaphore::new(config.fanout.global_concurrency));
        let provider_limits = registry
            .ids()
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    Arc::new(Semaphore::new(config.fanout.per_provider_concurrency)),
                )
            })
            .collect();

        Self {
            registry,
            config,
            provider_cache,
            breaker,
            limiter,
            global_limit,
            provider_limits,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Registered providers that are enabled by configuration.
    /// Providers without a config entry default to enabled.
    pub fn enabled_providers(&self) -> Vec<String> {
        self.registry
            .ids()
            .iter()
            .filter(|id| {
                self.config
                    .providers
                    .get(*id)
                    .map(|p| p.enabled)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    fn provider_timeout(&self, id: &str) -> Duration {
        let ms = self
            .config
            .providers
            .get(id)
            .and_then(|p| p.timeout_ms)
            .unwrap_or(self.config.fanout.timeout_ms);
        Duration::from_millis(ms.max(1))
    }

    fn provider_cache_key(provider: &dyn SubtitleProvider, query: &SearchQuery) -> String {
        let year = query.year.map(|y| y.to_string()).unwrap_or_default();
        format!(
            "{}::{}::{}",
            provider.id(),
            provider.normalize_query(query),
            year
        )
    }

    /// Run one fan-out across the given providers.
    pub async fn search(&self, query: &SearchQuery, providers: &[String]) -> FanoutResult {
        let start = Instant::now();
        let mut result = FanoutResult::default();
        let mut aggregated: Vec<Candidate> = Vec::new();
        let mut pending = Vec::new();

        for id in providers {
            let Some(provider) = self.registry.get(id) else {
                continue;
            };
            let stats = result.stats.entry(id.clone()).or_default();
            let cache_key = Self::provider_cache_key(provider.as_ref(), query);

            if let Some(cached) = self.provider_cache.get(&cache_key) {
                metrics::CACHE_LOOKUPS
                    .with_label_values(&["provider", "hit"])
                    .inc();
                stats.fetched += cached.len() as u32;
                aggregated.extend(cached);
                continue;
            }
            metrics::CACHE_LOOKUPS
                .with_label_values(&["provider", "miss"])
                .inc();

            if let Some(entry) = self.breaker.tripped(id, &query.cache_key()) {
                debug!(provider = %id, reason = %entry.reason, "skipping muted provider");
                metrics::PROVIDER_CALLS
                    .with_label_values(&[id, "skipped"])
                    .inc();
                stats.skipped += 1;
                continue;
            }

            pending.push(self.call_provider(provider, query, cache_key));
        }

        debug!(
            providers = pending.len(),
            query = %query.canonical_text(),
            "starting provider fan-out"
        );

        for (id, outcome, retries) in join_all(pending).await {
            let stats = result.stats.entry(id.clone()).or_default();
            stats.retries += retries;
            match outcome {
                CallOutcome::Hit(candidates) => {
                    stats.fetched += candidates.len() as u32;
                    aggregated.extend(candidates);
                }
                CallOutcome::TimedOut => {
                    stats.timeouts += 1;
                    stats.failed += 1;
                    result.provider_errors.insert(id, "timeout".to_string());
                }
                CallOutcome::Failed(reason) => {
                    stats.failed += 1;
                    result.provider_errors.insert(id, reason);
                }
            }
        }

        let deduped = dedupe_candidates(aggregated);
        for candidate in &deduped {
            if let Some(stats) = result.stats.get_mut(&candidate.provider) {
                stats.deduped += 1;
            }
        }
        result.candidates = deduped;
        result.duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            results = result.candidates.len(),
            duration_ms = result.duration_ms,
            "fan-out complete"
        );

        result
    }

    /// One provider's gated, retried, timed search call.
    async fn call_provider(
        &self,
        provider: Arc<dyn SubtitleProvider>,
        query: &SearchQuery,
        cache_key: String,
    ) -> (String, CallOutcome, u32) {
        let id = provider.id().to_string();
        let call_timeout = self.provider_timeout(&id);
        let started = Instant::now();

        let _global = self
            .global_limit
            .acquire()
            .await
            .expect("global semaphore closed");
        let _local = match self.provider_limits.get(&id) {
            Some(sem) => Some(sem.acquire().await.expect("provider semaphore closed")),
            None => None,
        };

        let mut retries = 0u32;
        let mut outcome = CallOutcome::Failed("no attempt made".to_string());

        for attempt in 0..=self.config.fanout.retries {
            if attempt > 0 {
                retries += 1;
                let backoff = self.config.fanout.retry_backoff_ms << (attempt - 1);
                sleep(Duration::from_millis(backoff)).await;
            }

            self.limiter.acquire(&id).await;

            match timeout(call_timeout, provider.search(query)).await {
                Ok(Ok(candidates)) => {
                    // Stamp the provider id; adapters are not trusted to.
                    let candidates: Vec<Candidate> = candidates
                        .into_iter()
                        .map(|mut c| {
                            c.provider = id.clone();
                            c
                        })
                        .collect();

                    let label = if candidates.is_empty() { "empty" } else { "ok" };
                    metrics::PROVIDER_CALLS.with_label_values(&[&id, label]).inc();
                    if !candidates.is_empty() {
                        self.provider_cache.set(&cache_key, candidates.clone());
                    }
                    outcome = CallOutcome::Hit(candidates);
                    break;
                }
                Ok(Err(err)) => {
                    warn!(provider = %id, error = %err, attempt, "provider search failed");
                    if attempt == self.config.fanout.retries {
                        let reason = match &err {
                            ProviderError::Timeout => "timeout".to_string(),
                            other => other.to_string(),
                        };
                        self.breaker.trip(&id, &query.cache_key(), &reason);
                        metrics::BREAKER_TRIPS.with_label_values(&[&id]).inc();
                        metrics::PROVIDER_CALLS
                            .with_label_values(&[&id, "error"])
                            .inc();
                        outcome = if matches!(err, ProviderError::Timeout) {
                            CallOutcome::TimedOut
                        } else {
                            CallOutcome::Failed(reason)
                        };
                    }
                }
                Err(_elapsed) => {
                    warn!(provider = %id, timeout_ms = call_timeout.as_millis() as u64, attempt, "provider search timed out");
                    if attempt == self.config.fanout.retries {
                        self.breaker.trip(&id, &query.cache_key(), "timeout");
                        metrics::BREAKER_TRIPS.with_label_values(&[&id]).inc();
                        metrics::PROVIDER_CALLS
                            .with_label_values(&[&id, "timeout"])
                            .inc();
                        outcome = CallOutcome::TimedOut;
                    }
                }
            }
        }

        metrics::PROVIDER_DURATION
            .with_label_values(&[&id])
            .observe(started.elapsed().as_secs_f64());

        (id, outcome, retries)
    }
}
