//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Fan-out orchestrator (provider calls, durations, breaker trips)
//! - Caches (hits/misses per cache)
//! - Resolver (resolutions, singleflight waits)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// Provider search calls by provider and result.
pub static PROVIDER_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("subplex_provider_calls_total", "Total provider search calls"),
        &["provider", "result"], // "ok", "empty", "timeout", "error", "skipped"
    )
    .unwrap()
});

/// Provider search duration in seconds.
pub static PROVIDER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "subplex_provider_duration_seconds",
            "Duration of provider search calls",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]),
        &["provider"],
    )
    .unwrap()
});

/// Breaker trips by provider.
pub static BREAKER_TRIPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("subplex_breaker_trips_total", "Provider breaker trips"),
        &["provider"],
    )
    .unwrap()
});

/// Cache lookups by cache name and outcome.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("subplex_cache_lookups_total", "Cache lookups"),
        &["cache", "outcome"], // cache: "result", "empty", "resolved", "provider"
    )
    .unwrap()
});

/// Token resolutions by result.
pub static RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("subplex_resolutions_total", "Token resolutions"),
        &["result"], // "ok", "cached", "decode_error", "download_error", "extract_error", "unsupported"
    )
    .unwrap()
});

/// Singleflight waiter outcomes.
pub static SINGLEFLIGHT_WAITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "subplex_singleflight_waits_total",
            "Singleflight waiter outcomes",
        ),
        &["outcome"], // "shared", "promoted", "timeout"
    )
    .unwrap()
});

/// Register all core metrics with the given registry.
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(PROVIDER_CALLS.clone()))?;
    registry.register(Box::new(PROVIDER_DURATION.clone()))?;
    registry.register(Box::new(BREAKER_TRIPS.clone()))?;
    registry.register(Box::new(CACHE_LOOKUPS.clone()))?;
    registry.register(Box::new(RESOLUTIONS.clone()))?;
    registry.register(Box::new(SINGLEFLIGHT_WAITS.clone()))?;
    Ok(())
}
