use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ranker::ScoreWeights;

/// Root engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub ranking: ScoreWeights,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Per-provider settings, keyed by provider id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Fan-out orchestrator limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FanoutConfig {
    /// Concurrency ceiling across all providers.
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,
    /// Concurrency ceiling per provider.
    #[serde(default = "default_per_provider_concurrency")]
    pub per_provider_concurrency: usize,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Base delay between retries; doubles per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            global_concurrency: default_global_concurrency(),
            per_provider_concurrency: default_per_provider_concurrency(),
            timeout_ms: default_provider_timeout_ms(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_global_concurrency() -> usize {
    5
}

fn default_per_provider_concurrency() -> usize {
    2
}

fn default_provider_timeout_ms() -> u64 {
    3000
}

fn default_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

/// TTLs for the engine caches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Positive aggregate search results.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    /// Negative "known empty" search results.
    #[serde(default = "default_empty_ttl_secs")]
    pub empty_ttl_secs: u64,
    /// Resolved subtitle content.
    #[serde(default = "default_resolved_ttl_secs")]
    pub resolved_ttl_secs: u64,
    /// Per-provider search results.
    #[serde(default = "default_provider_ttl_secs")]
    pub provider_ttl_secs: u64,
    /// Breaker mute window.
    #[serde(default = "default_breaker_ttl_secs")]
    pub breaker_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: default_result_ttl_secs(),
            empty_ttl_secs: default_empty_ttl_secs(),
            resolved_ttl_secs: default_resolved_ttl_secs(),
            provider_ttl_secs: default_provider_ttl_secs(),
            breaker_ttl_secs: default_breaker_ttl_secs(),
        }
    }
}

fn default_result_ttl_secs() -> u64 {
    1800
}

fn default_empty_ttl_secs() -> u64 {
    300
}

fn default_resolved_ttl_secs() -> u64 {
    300
}

fn default_provider_ttl_secs() -> u64 {
    300
}

fn default_breaker_ttl_secs() -> u64 {
    30
}

/// Result selection limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    /// Results kept per provider.
    #[serde(default = "default_per_provider_cap")]
    pub per_provider_cap: usize,
    /// Providers exempt from the per-provider cap.
    #[serde(default)]
    pub uncapped_providers: Vec<String>,
    /// Global best-N across all providers; bypasses per-provider caps.
    /// Zero disables.
    #[serde(default)]
    pub global_cap: usize,
    /// Re-rank by parsed release attributes when the strict filter leaves
    /// nothing.
    #[serde(default)]
    pub soft_match: bool,
    #[serde(default)]
    pub strict: StrictConfig,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            per_provider_cap: default_per_provider_cap(),
            uncapped_providers: Vec::new(),
            global_cap: 0,
            soft_match: false,
            strict: StrictConfig::default(),
        }
    }
}

fn default_per_provider_cap() -> usize {
    1
}

/// Strict release filtering. Each flag requires the corresponding release
/// attribute of a candidate to match the playing file when both are known.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StrictConfig {
    #[serde(default)]
    pub source: bool,
    #[serde(default)]
    pub resolution: bool,
    #[serde(default)]
    pub codec: bool,
    #[serde(default)]
    pub group: bool,
    #[serde(default)]
    pub fps: bool,
}

impl StrictConfig {
    pub fn any_enabled(&self) -> bool {
        self.source || self.resolution || self.codec || self.group || self.fps
    }
}

/// Resolution-path settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Total download attempts per resolution.
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,
    /// Delay between download attempts in milliseconds.
    #[serde(default = "default_download_retry_delay_ms")]
    pub download_retry_delay_ms: u64,
    /// How long a singleflight waiter blocks before giving up.
    #[serde(default = "default_waiter_timeout_ms")]
    pub waiter_timeout_ms: u64,
    #[serde(default)]
    pub preprobe: PreprobeConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            download_retries: default_download_retries(),
            download_retry_delay_ms: default_download_retry_delay_ms(),
            waiter_timeout_ms: default_waiter_timeout_ms(),
            preprobe: PreprobeConfig::default(),
        }
    }
}

fn default_download_retries() -> u32 {
    3
}

fn default_download_retry_delay_ms() -> u64 {
    300
}

fn default_waiter_timeout_ms() -> u64 {
    10_000
}

/// Optional pre-download validation of listings from flaky providers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreprobeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Providers whose listings get probed.
    #[serde(default)]
    pub providers: Vec<String>,
    /// Maximum number of listings probed per search.
    #[serde(default = "default_preprobe_limit")]
    pub limit: usize,
}

impl Default for PreprobeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            providers: Vec::new(),
            limit: default_preprobe_limit(),
        }
    }
}

fn default_preprobe_limit() -> usize {
    4
}

/// Deployment-specific exclusions, kept as data rather than code.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PolicyConfig {
    /// Providers removed from the fan-out entirely.
    #[serde(default)]
    pub excluded_providers: Vec<String>,
    /// (provider, reference substring) pairs whose downloads are refused.
    #[serde(default)]
    pub blocked_references: Vec<BlockedReference>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BlockedReference {
    pub provider: String,
    pub substring: String,
}

/// Per-provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum interval between calls to this provider.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Per-provider timeout override.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Per-provider breaker TTL override.
    #[serde(default)]
    pub breaker_ttl_secs: Option<u64>,
    /// HTTP gateway backend, when this provider is served through one.
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            min_interval_ms: default_min_interval_ms(),
            timeout_ms: None,
            breaker_ttl_secs: None,
            gateway: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_min_interval_ms() -> u64 {
    100
}

/// JSON gateway backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Gateway base URL (e.g. "http://localhost:9321").
    pub url: String,
    /// Gateway API key.
    pub api_key: String,
    /// Request timeout in seconds (default: 12).
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u32,
}

fn default_gateway_timeout() -> u32 {
    12
}

/// Sanitized config for API responses (secrets redacted).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub fanout: FanoutConfig,
    pub cache: CacheConfig,
    pub selection: SelectionConfig,
    pub resolver: ResolverConfig,
    pub policy: PolicyConfig,
    pub providers: BTreeMap<String, SanitizedProviderConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub enabled: bool,
    pub min_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<SanitizedGatewayConfig>,
}

/// Sanitized gateway config (API key hidden).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGatewayConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

impl From<&EngineConfig> for SanitizedConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fanout: config.fanout.clone(),
            cache: config.cache.clone(),
            selection: config.selection.clone(),
            resolver: config.resolver.clone(),
            policy: config.policy.clone(),
            providers: config
                .providers
                .iter()
                .map(|(id, p)| {
                    (
                        id.clone(),
                        SanitizedProviderConfig {
                            enabled: p.enabled,
                            min_interval_ms: p.min_interval_ms,
                            gateway: p.gateway.as_ref().map(|g| SanitizedGatewayConfig {
                                url: g.url.clone(),
                                api_key_configured: !g.api_key.is_empty(),
                                timeout_secs: g.timeout_secs,
                            }),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fanout.global_concurrency, 5);
        assert_eq!(config.fanout.per_provider_concurrency, 2);
        assert_eq!(config.cache.result_ttl_secs, 1800);
        assert_eq!(config.cache.empty_ttl_secs, 300);
        assert_eq!(config.selection.per_provider_cap, 1);
        assert_eq!(config.resolver.download_retries, 3);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.fanout.timeout_ms, 3000);
        assert_eq!(config.cache.breaker_ttl_secs, 30);
    }

    #[test]
    fn test_deserialize_provider_table() {
        let toml = r#"
[providers.unacs]
min_interval_ms = 250

[providers.flaky]
enabled = false
timeout_ms = 4000
breaker_ttl_secs = 120

[providers.gatewayed.gateway]
url = "http://localhost:9321"
api_key = "secret"
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.providers["unacs"].min_interval_ms, 250);
        assert!(!config.providers["flaky"].enabled);
        assert_eq!(config.providers["flaky"].timeout_ms, Some(4000));
        assert_eq!(config.providers["flaky"].breaker_ttl_secs, Some(120));

        let gateway = config.providers["gatewayed"].gateway.as_ref().unwrap();
        assert_eq!(gateway.url, "http://localhost:9321");
        assert_eq!(gateway.timeout_secs, 12); // default
    }

    #[test]
    fn test_deserialize_policy() {
        let toml = r#"
[policy]
excluded_providers = ["yavka"]

[[policy.blocked_references]]
provider = "unacs"
substring = "The_Addams_Family"
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.policy.excluded_providers, vec!["yavka"]);
        assert_eq!(
            config.policy.blocked_references[0],
            BlockedReference {
                provider: "unacs".to_string(),
                substring: "The_Addams_Family".to_string(),
            }
        );
    }

    #[test]
    fn test_sanitized_config_hides_api_key() {
        let toml = r#"
[providers.gatewayed.gateway]
url = "http://localhost:9321"
api_key = "super-secret"
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));

        let gateway = sanitized.providers["gatewayed"].gateway.as_ref().unwrap();
        assert!(gateway.api_key_configured);
    }

    #[test]
    fn test_strict_any_enabled() {
        let mut strict = StrictConfig::default();
        assert!(!strict.any_enabled());
        strict.fps = true;
        assert!(strict.any_enabled());
    }
}
