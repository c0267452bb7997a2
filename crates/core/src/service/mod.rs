//! Engine facade: search-to-listings and token resolution.
//!
//! `SubtitleService` owns the caches and wires the data flow: identifier →
//! normalizer → fan-out orchestrator → ranker → token listings, and later
//! token → singleflight resolver → bytes.

mod listing;

pub use listing::{build_display_name, build_filename, provider_label};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::metrics;
use crate::provider::{Candidate, ProviderRegistry};
use crate::query::{normalize, MediaKind, QueryHints};
use crate::ranker::{rank_and_select, PlayerContext};
use crate::resolver::{ResolveError, ResolvedSubtitle, SubtitleResolver};
use crate::searcher::FanoutOrchestrator;
use crate::token::{encode, TokenPayload};

/// How long an empty outcome stays provisional before the negative cache
/// records it.
const EMPTY_MARK_DELAY: Duration = Duration::from_secs(2);

/// One client-facing search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtitleListing {
    /// Stable listing id: `provider:index`.
    pub id: String,
    /// Opaque handle for the download path.
    pub token: String,
    /// Human-readable display name.
    pub name: String,
    pub filename: String,
    pub format: String,
    pub provider: String,
}

/// The aggregation/resolution engine behind the subtitle routes.
pub struct SubtitleService {
    config: EngineConfig,
    orchestrator: FanoutOrchestrator,
    resolver: SubtitleResolver,
    result_cache: TtlCache<Vec<SubtitleListing>>,
    empty_cache: Arc<TtlCache<bool>>,
    pending_empty_marks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SubtitleService {
    pub fn new(registry: ProviderRegistry, config: EngineConfig) -> Self {
        let result_cache = TtlCache::new(Duration::from_secs(config.cache.result_ttl_secs));
        let empty_cache = Arc::new(TtlCache::new(Duration::from_secs(config.cache.empty_ttl_secs)));
        let orchestrator = FanoutOrchestrator::new(registry.clone(), config.clone());
        let resolver = SubtitleResolver::new(registry, config.clone());

        Self {
            config,
            orchestrator,
            resolver,
            result_cache,
            empty_cache,
            pending_empty_marks: Mutex::new(HashMap::new()),
        }
    }

    /// Search all enabled providers for a media identifier and return
    /// ranked, tokenized listings. Never fails: an unresolvable query or a
    /// fully degraded fan-out yields an empty, negatively cached list.
    pub async fn search(
        &self,
        kind: MediaKind,
        raw_id: &str,
        hints: &QueryHints,
        player_fps: Option<f32>,
    ) -> Vec<SubtitleListing> {
        let cache_key = self.result_cache_key(kind, raw_id, hints, player_fps);

        if let Some(cached) = self.result_cache.get(&cache_key) {
            metrics::CACHE_LOOKUPS
                .with_label_values(&["result", "hit"])
                .inc();
            return cached;
        }
        metrics::CACHE_LOOKUPS
            .with_label_values(&["result", "miss"])
            .inc();

        if self.empty_cache.get(&cache_key).is_some() {
            metrics::CACHE_LOOKUPS
                .with_label_values(&["empty", "hit"])
                .inc();
            return Vec::new();
        }

        let query = match normalize(kind, raw_id, hints) {
            Ok(query) => query,
            Err(err) => {
                info!(raw_id, error = %err, "query normalization failed");
                self.schedule_empty_mark(&cache_key);
                return Vec::new();
            }
        };

        let providers = self.active_providers();
        if providers.is_empty() {
            warn!("no active providers configured");
            self.schedule_empty_mark(&cache_key);
            return Vec::new();
        }

        let mut fanout = self.orchestrator.search(&query, &providers).await;
        if fanout.candidates.is_empty() {
            self.schedule_empty_mark(&cache_key);
            return Vec::new();
        }

        let ctx = PlayerContext::new(hints.filename.as_deref(), player_fps);
        let selected = rank_and_select(
            std::mem::take(&mut fanout.candidates),
            &query,
            &ctx,
            &self.config.ranking,
            &self.config.selection,
        );

        let listings = self.build_listings(&selected);
        let listings = self.preprobe_filter(listings).await;

        for listing in &listings {
            if let Some(stats) = fanout.stats.get_mut(&listing.provider) {
                stats.finalized += 1;
            }
        }
        debug!(
            duration_ms = fanout.duration_ms,
            "provider stats\n{}",
            fanout.stats_table()
        );

        if listings.is_empty() {
            // Never let a transient empty round shadow a known-good result.
            if self.result_cache.get(&cache_key).is_none() {
                self.schedule_empty_mark(&cache_key);
            }
            return listings;
        }

        self.cancel_empty_mark(&cache_key);
        self.empty_cache.remove(&cache_key);
        if self.result_cache.get(&cache_key).is_none() {
            self.result_cache.set(&cache_key, listings.clone());
        }
        listings
    }

    /// Resolve a listing token into subtitle bytes.
    pub async fn resolve(&self, token: &str) -> Result<ResolvedSubtitle, ResolveError> {
        self.resolver.resolve(token).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Enabled providers minus the deployment policy exclusions.
    fn active_providers(&self) -> Vec<String> {
        self.orchestrator
            .enabled_providers()
            .into_iter()
            .filter(|id| !self.config.policy.excluded_providers.contains(id))
            .collect()
    }

    fn result_cache_key(
        &self,
        kind: MediaKind,
        raw_id: &str,
        hints: &QueryHints,
        player_fps: Option<f32>,
    ) -> String {
        let kind = match kind {
            MediaKind::Movie => "movie",
            MediaKind::Series => "series",
        };
        let base = format!(
            "{kind}:{raw_id}:k{}",
            self.config.selection.per_provider_cap
        );

        let mut parts: Vec<String> = Vec::new();
        if let Some(filename) = hints.filename.as_deref().filter(|f| !f.trim().is_empty()) {
            parts.push(filename.trim().to_string());
        }
        if let Some(fps) = player_fps.filter(|f| *f > 0.0) {
            parts.push(format!("{fps:.3}"));
        }
        if parts.is_empty() {
            return base;
        }
        let digest = Sha256::digest(parts.join("||").as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("{base}:p{}", &hex[..12])
    }

    fn build_listings(&self, selected: &[Candidate]) -> Vec<SubtitleListing> {
        selected
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let filename = build_filename(candidate, index);
                let format = filename
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_lowercase())
                    .unwrap_or_else(|| "srt".to_string());

                let payload = TokenPayload {
                    provider: candidate.provider.clone(),
                    reference: candidate.reference.clone(),
                    format: Some(format.clone()),
                    fps: candidate.fps.filter(|f| *f > 0.0),
                    extra: candidate.extra.clone(),
                };

                SubtitleListing {
                    id: format!("{}:{}", candidate.provider, index),
                    token: encode(&payload),
                    name: build_display_name(candidate),
                    filename,
                    format,
                    provider: candidate.provider.clone(),
                }
            })
            .collect()
    }

    /// Optional pre-download validation: resolve a bounded number of
    /// listings from configured flaky providers and drop the ones whose
    /// repaired payload is not a usable text subtitle.
    async fn preprobe_filter(&self, listings: Vec<SubtitleListing>) -> Vec<SubtitleListing> {
        let preprobe = &self.config.resolver.preprobe;
        if !preprobe.enabled || preprobe.providers.is_empty() {
            return listings;
        }

        let mut kept = Vec::with_capacity(listings.len());
        let mut probed = 0usize;

        for listing in listings {
            let should_probe =
                preprobe.providers.contains(&listing.provider) && probed < preprobe.limit;
            if !should_probe {
                kept.push(listing);
                continue;
            }
            probed += 1;

            match self.resolver.resolve(&listing.token).await {
                Ok(resolved) => {
                    let usable = matches!(resolved.format.as_str(), "srt" | "txt")
                        && !resolved.content.is_empty()
                        && (resolved.format != "srt"
                            || String::from_utf8_lossy(&resolved.content).contains("-->"));
                    if usable {
                        kept.push(listing);
                    } else {
                        info!(provider = %listing.provider, "preprobe dropped unusable listing");
                    }
                }
                Err(err) => {
                    info!(provider = %listing.provider, error = %err, "preprobe dropped failing listing");
                }
            }
        }
        kept
    }

    /// Record an empty outcome after a short grace period. A concurrent
    /// success for the same key cancels the mark, so a slow positive round
    /// is never shadowed by a racing empty one.
    fn schedule_empty_mark(&self, cache_key: &str) {
        let key = cache_key.to_string();
        let empty_cache = Arc::clone(&self.empty_cache);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(EMPTY_MARK_DELAY).await;
            empty_cache.set(&key, true);
        });

        let mut pending = self.pending_empty_marks.lock().expect("empty marks lock");
        if let Some(previous) = pending.insert(cache_key.to_string(), handle) {
            previous.abort();
        }
    }

    fn cancel_empty_mark(&self, cache_key: &str) {
        let mut pending = self.pending_empty_marks.lock().expect("empty marks lock");
        if let Some(handle) = pending.remove(cache_key) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::testing::{fixtures, MockProvider};

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.fanout.retries = 0;
        config.resolver.download_retry_delay_ms = 1;
        config
    }

    fn make_service(
        providers: Vec<Arc<MockProvider>>,
        config: EngineConfig,
    ) -> SubtitleService {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider);
        }
        SubtitleService::new(registry, config)
    }

    #[tokio::test]
    async fn test_search_produces_resolvable_tokens() {
        let provider = Arc::new(MockProvider::new("unacs"));
        provider.set_results(vec![fixtures::detailed_candidate(
            "unacs",
            "ref-1",
            "Heat 1995 1080p BluRay",
            1995,
            23.976,
        )]);
        provider.set_download("heat.srt", fixtures::srt_bytes());

        let service = make_service(vec![provider], fast_config());
        let listings = service
            .search(
                MediaKind::Movie,
                "tt0113277",
                &QueryHints {
                    title: Some("Heat".to_string()),
                    year: Some(1995),
                    ..Default::default()
                },
                None,
            )
            .await;

        assert_eq!(listings.len(), 1);
        let listing = &listings[0];
        assert_eq!(listing.provider, "unacs");
        assert_eq!(listing.id, "unacs:0");
        assert!(listing.name.starts_with("[Unacs]"));

        let resolved = service.resolve(&listing.token).await.unwrap();
        assert_eq!(resolved.format, "srt");
        assert!(!resolved.content.is_empty());
    }

    #[tokio::test]
    async fn test_search_results_are_cached() {
        let provider = Arc::new(MockProvider::new("unacs"));
        provider.set_results(vec![fixtures::candidate("unacs", "ref-1", "Heat 1995")]);

        let service = make_service(vec![Arc::clone(&provider)], fast_config());
        let hints = QueryHints {
            title: Some("Heat".to_string()),
            ..Default::default()
        };

        let first = service
            .search(MediaKind::Movie, "tt0113277", &hints, None)
            .await;
        let second = service
            .search(MediaKind::Movie, "tt0113277", &hints, None)
            .await;

        assert_eq!(first, second);
        assert_eq!(provider.search_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_negatively_cached() {
        let provider = Arc::new(MockProvider::new("unacs"));

        let service = make_service(vec![Arc::clone(&provider)], fast_config());
        let hints = QueryHints {
            title: Some("Nothing".to_string()),
            ..Default::default()
        };

        let listings = service
            .search(MediaKind::Movie, "tt0000001", &hints, None)
            .await;
        assert!(listings.is_empty());

        // Let the deferred empty mark land.
        tokio::time::sleep(Duration::from_secs(3)).await;

        let listings = service
            .search(MediaKind::Movie, "tt0000001", &hints, None)
            .await;
        assert!(listings.is_empty());
        // Second search was served from the negative cache.
        assert_eq!(provider.search_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_success_cancels_empty_mark() {
        let provider = Arc::new(MockProvider::new("unacs"));

        let service = make_service(vec![Arc::clone(&provider)], fast_config());
        let hints = QueryHints {
            title: Some("Heat".to_string()),
            ..Default::default()
        };

        // First round: nothing found, mark scheduled but not yet landed.
        service
            .search(MediaKind::Movie, "tt0113277", &hints, None)
            .await;

        // Provider recovers before the mark lands.
        provider.set_results(vec![fixtures::candidate("unacs", "ref-1", "Heat 1995")]);
        let listings = service
            .search(MediaKind::Movie, "tt0113277", &hints, None)
            .await;
        assert_eq!(listings.len(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;

        // The positive result survived; no negative entry shadowed it.
        let listings = service
            .search(MediaKind::Movie, "tt0113277", &hints, None)
            .await;
        assert_eq!(listings.len(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_query_is_empty() {
        let provider = Arc::new(MockProvider::new("unacs"));
        let service = make_service(vec![Arc::clone(&provider)], fast_config());

        let listings = service
            .search(MediaKind::Movie, "tt0000001", &QueryHints::default(), None)
            .await;
        assert!(listings.is_empty());
        assert_eq!(provider.search_count(), 0);
    }

    #[tokio::test]
    async fn test_policy_excluded_provider_is_never_called() {
        let allowed = Arc::new(MockProvider::new("allowed"));
        allowed.set_results(vec![fixtures::candidate("allowed", "ref-1", "Heat 1995")]);
        let excluded = Arc::new(MockProvider::new("excluded"));
        excluded.set_results(vec![fixtures::candidate("excluded", "ref-2", "Heat 1995")]);

        let mut config = fast_config();
        config.policy.excluded_providers.push("excluded".to_string());

        let service = make_service(vec![allowed, Arc::clone(&excluded)], config);
        let listings = service
            .search(
                MediaKind::Movie,
                "tt0113277",
                &QueryHints {
                    title: Some("Heat".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await;

        assert!(listings.iter().all(|l| l.provider == "allowed"));
        assert_eq!(excluded.search_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_provider_degrades_search() {
        let good = Arc::new(MockProvider::new("good"));
        good.set_results(vec![fixtures::candidate("good", "ref-1", "Heat 1995")]);
        let bad = Arc::new(MockProvider::new("bad"));
        bad.fail_always(ProviderError::Api("down".to_string()));

        let service = make_service(vec![good, bad], fast_config());
        let listings = service
            .search(
                MediaKind::Movie,
                "tt0113277",
                &QueryHints {
                    title: Some("Heat".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await;

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].provider, "good");
    }

    #[tokio::test]
    async fn test_preprobe_drops_unusable_listing() {
        let flaky = Arc::new(MockProvider::new("flaky"));
        flaky.set_results(vec![fixtures::candidate("flaky", "ref-1", "Heat 1995")]);
        // Claims .srt but has no cues: repaired output has no separators.
        flaky.set_download("broken.srt", b"not a subtitle at all".to_vec());

        let steady = Arc::new(MockProvider::new("steady"));
        steady.set_results(vec![fixtures::candidate("steady", "ref-2", "Heat 1995")]);
        steady.set_download("good.srt", fixtures::srt_bytes());

        let mut config = fast_config();
        config.resolver.preprobe.enabled = true;
        config.resolver.preprobe.providers = vec!["flaky".to_string()];

        let service = make_service(vec![flaky, steady], config);
        let listings = service
            .search(
                MediaKind::Movie,
                "tt0113277",
                &QueryHints {
                    title: Some("Heat".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await;

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].provider, "steady");
    }

    #[tokio::test]
    async fn test_player_context_changes_cache_key() {
        let provider = Arc::new(MockProvider::new("unacs"));
        provider.set_results(vec![fixtures::candidate("unacs", "ref-1", "Heat 1995")]);

        let service = make_service(vec![Arc::clone(&provider)], fast_config());
        let plain = QueryHints {
            title: Some("Heat".to_string()),
            ..Default::default()
        };
        let with_file = QueryHints {
            title: Some("Heat".to_string()),
            filename: Some("Heat.1995.1080p.BluRay.mkv".to_string()),
            ..Default::default()
        };

        service
            .search(MediaKind::Movie, "tt0113277", &plain, None)
            .await;
        assert_eq!(provider.search_count(), 1);

        // Different player context, different aggregate cache entry: the
        // second search fans out again instead of reusing the first.
        service
            .search(MediaKind::Movie, "tt0113277", &with_file, Some(23.976))
            .await;
        assert_eq!(provider.search_count(), 2);

        // Identical context is then served from the aggregate cache.
        service
            .search(MediaKind::Movie, "tt0113277", &with_file, Some(23.976))
            .await;
        assert_eq!(provider.search_count(), 2);
    }
}
