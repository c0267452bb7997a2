//! Singleflight-protected download and repair of a chosen subtitle.
//!
//! `resolve(token)` is the only path that performs real downloads. The
//! resolved-content cache is checked first; concurrent callers for the
//! same token share one download via the singleflight guard, and waiters
//! time out (and may take over) rather than block indefinitely.

mod singleflight;

pub use singleflight::{Flight, OwnerGuard, Singleflight};

use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::metrics;
use crate::provider::{DownloadedFile, ProviderRegistry, SubtitleProvider};
use crate::repair::{repair, ExtractionError, RepairError};
use crate::token::{decode, DecodeError, TokenPayload};

/// The cleaned, client-safe subtitle produced for one token.
///
/// Created once per token, cached, and handed to every concurrent and
/// future waiter until TTL expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSubtitle {
    pub filename: String,
    pub content: Vec<u8>,
    pub encoding: String,
    pub format: String,
}

/// Failures surfaced to the caller of `resolve`.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Malformed client-supplied token; rejected before any I/O.
    #[error("invalid subtitle token: {0}")]
    Decode(#[from] DecodeError),

    #[error("token does not name a registered provider: {0}")]
    UnknownProvider(String),

    /// Deployment policy refuses this (provider, reference) pair.
    #[error("subtitle is blocked for this title; choose another source")]
    Blocked,

    /// Download retries exhausted; gateway-style failure.
    #[error("failed to download subtitle from {provider}: {reason}")]
    Download { provider: String, reason: String },

    #[error("source did not return a subtitle payload")]
    EmptyPayload,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    UnsupportedFormat(String),
}

impl From<RepairError> for ResolveError {
    fn from(err: RepairError) -> Self {
        match err {
            RepairError::Extraction(e) => ResolveError::Extraction(e),
            RepairError::UnsupportedFormat(what) => ResolveError::UnsupportedFormat(format!(
                "unsupported subtitle format ({what}); choose an SRT/MicroDVD variant"
            )),
        }
    }
}

/// Singleflight resolver over the provider registry.
pub struct SubtitleResolver {
    registry: ProviderRegistry,
    config: EngineConfig,
    resolved_cache: TtlCache<ResolvedSubtitle>,
    flight: Singleflight,
}

impl SubtitleResolver {
    pub fn new(registry: ProviderRegistry, config: EngineConfig) -> Self {
        let resolved_cache = TtlCache::new(Duration::from_secs(config.cache.resolved_ttl_secs));
        Self {
            registry,
            config,
            resolved_cache,
            flight: Singleflight::new(),
        }
    }

    /// Resolve a client-supplied token into subtitle bytes.
    pub async fn resolve(&self, token: &str) -> Result<ResolvedSubtitle, ResolveError> {
        if let Some(cached) = self.resolved_cache.get(token) {
            metrics::RESOLUTIONS.with_label_values(&["cached"]).inc();
            metrics::CACHE_LOOKUPS
                .with_label_values(&["resolved", "hit"])
                .inc();
            return Ok(cached);
        }
        metrics::CACHE_LOOKUPS
            .with_label_values(&["resolved", "miss"])
            .inc();

        // Decode before any synchronization or I/O: malformed tokens are
        // rejected immediately.
        let payload = decode(token).inspect_err(|e| {
            warn!(error = %e, "invalid subtitle token");
            metrics::RESOLUTIONS.with_label_values(&["decode_error"]).inc();
        })?;

        self.check_policy(&payload)?;

        match self.flight.begin(token) {
            Flight::Owner(_guard) => self.resolve_owned(token, &payload).await,
            Flight::Waiter(notify) => {
                let wait = Duration::from_millis(self.config.resolver.waiter_timeout_ms);
                let woken = timeout(wait, notify.notified()).await.is_ok();

                if let Some(cached) = self.resolved_cache.get(token) {
                    metrics::SINGLEFLIGHT_WAITS
                        .with_label_values(&["shared"])
                        .inc();
                    return Ok(cached);
                }

                if !woken {
                    metrics::SINGLEFLIGHT_WAITS
                        .with_label_values(&["timeout"])
                        .inc();
                }

                // The owner failed or timed out without a result; this
                // waiter takes over and retries.
                match self.flight.begin(token) {
                    Flight::Owner(_guard) => {
                        metrics::SINGLEFLIGHT_WAITS
                            .with_label_values(&["promoted"])
                            .inc();
                        debug!(token = token, "waiter promoted to resolution owner");
                        self.resolve_owned(token, &payload).await
                    }
                    // A different waiter already took over; resolve
                    // without the guard rather than queueing unboundedly.
                    Flight::Waiter(_) => self.resolve_owned(token, &payload).await,
                }
            }
        }
    }

    fn check_policy(&self, payload: &TokenPayload) -> Result<(), ResolveError> {
        let blocked = self
            .config
            .policy
            .blocked_references
            .iter()
            .any(|b| b.provider == payload.provider && payload.reference.contains(&b.substring));
        if blocked {
            warn!(
                provider = %payload.provider,
                reference = %payload.reference,
                "blocked by deployment policy"
            );
            return Err(ResolveError::Blocked);
        }
        Ok(())
    }

    /// The real download + repair, run by exactly one owner per token.
    async fn resolve_owned(
        &self,
        token: &str,
        payload: &TokenPayload,
    ) -> Result<ResolvedSubtitle, ResolveError> {
        let downloaded = self.download_with_retries(payload).await?;

        if downloaded.bytes.is_empty() {
            metrics::RESOLUTIONS
                .with_label_values(&["download_error"])
                .inc();
            return Err(ResolveError::EmptyPayload);
        }

        let repaired = repair(&downloaded.bytes, &downloaded.name, payload.fps).map_err(|e| {
            let label = match &e {
                RepairError::Extraction(_) => "extract_error",
                RepairError::UnsupportedFormat(_) => "unsupported",
            };
            metrics::RESOLUTIONS.with_label_values(&[label]).inc();
            warn!(provider = %payload.provider, error = %e, "repair pipeline failed");
            ResolveError::from(e)
        })?;

        let resolved = ResolvedSubtitle {
            filename: repaired.name,
            content: repaired.content,
            encoding: repaired.encoding,
            format: repaired.format,
        };

        self.resolved_cache.set(token, resolved.clone());
        metrics::RESOLUTIONS.with_label_values(&["ok"]).inc();
        debug!(
            provider = %payload.provider,
            filename = %resolved.filename,
            bytes = resolved.content.len(),
            "subtitle resolved"
        );
        Ok(resolved)
    }

    async fn download_with_retries(
        &self,
        payload: &TokenPayload,
    ) -> Result<DownloadedFile, ResolveError> {
        let provider = self
            .registry
            .get(&payload.provider)
            .ok_or_else(|| ResolveError::UnknownProvider(payload.provider.clone()))?;

        let attempts = self.config.resolver.download_retries.max(1);
        let delay = Duration::from_millis(self.config.resolver.download_retry_delay_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match provider.download(payload).await {
                Ok(file) => return Ok(file),
                Err(err) => {
                    warn!(
                        provider = %payload.provider,
                        attempt,
                        error = %err,
                        "subtitle download failed"
                    );
                    last_error = err.to_string();
                    if attempt < attempts && !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }

        metrics::RESOLUTIONS
            .with_label_values(&["download_error"])
            .inc();
        Err(ResolveError::Download {
            provider: payload.provider.clone(),
            reason: last_error,
        })
    }
}
