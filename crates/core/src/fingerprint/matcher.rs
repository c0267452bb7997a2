//! Pure fingerprint scoring.

use std::time::Duration;

use crate::cache::TtlCache;

use super::types::{CandidateFingerprint, ProbeFingerprint};

/// Cues per second of runtime judged as ideal density.
const TARGET_CUE_DENSITY: f64 = 0.5;
/// First-cue offsets beyond this many seconds are fully penalized.
const MAX_START_OFFSET_SECS: f64 = 3.0;

const HASH_WEIGHT: f64 = 0.6;
const RUNTIME_WEIGHT: f64 = 0.2;
const DENSITY_WEIGHT: f64 = 0.1;
const OFFSET_WEIGHT: f64 = 0.1;

/// Ratio of the smaller to the larger runtime; 0 when either is unknown.
fn runtime_ratio(candidate_runtime: f64, probe_runtime: f64) -> f64 {
    if candidate_runtime <= 0.0 || probe_runtime <= 0.0 {
        return 0.0;
    }
    let smaller = candidate_runtime.min(probe_runtime);
    let larger = candidate_runtime.max(probe_runtime);
    (smaller / larger).clamp(0.0, 1.0)
}

/// Cue count per second of probe runtime, scaled against the target
/// density.
fn cue_density_score(candidate: &CandidateFingerprint, probe_runtime: f64) -> f64 {
    if candidate.cues.is_empty() || probe_runtime <= 0.0 {
        return 0.0;
    }
    let density = candidate.cues.len() as f64 / probe_runtime;
    (density / TARGET_CUE_DENSITY).min(1.0)
}

/// Penalize candidates whose first cue begins far from time zero.
fn offset_score(candidate: &CandidateFingerprint) -> f64 {
    if candidate.cues.is_empty() {
        return 0.0;
    }
    let offset = candidate.start_offset_secs();
    if offset <= 0.0 {
        return 1.0;
    }
    (1.0 - (offset / MAX_START_OFFSET_SECS).min(1.0)).max(0.0)
}

/// Score one candidate fingerprint against the probe. An exact content
/// hash match dominates; runtime similarity, cue density and start offset
/// refine the rest. Result is clamped to [0, 1].
pub fn score_fingerprint(probe: &ProbeFingerprint, candidate: &CandidateFingerprint) -> f64 {
    let hash_score = if !probe.hash.is_empty() && candidate.hash == probe.hash {
        1.0
    } else {
        0.0
    };
    let runtime_score = runtime_ratio(candidate.runtime_secs, probe.runtime_secs);
    let density_score = cue_density_score(candidate, probe.runtime_secs);
    let offset = offset_score(candidate);

    let score = hash_score * HASH_WEIGHT
        + runtime_score * RUNTIME_WEIGHT
        + density_score * DENSITY_WEIGHT
        + offset * OFFSET_WEIGHT;
    score.clamp(0.0, 1.0)
}

/// Top-K candidates by score, ties broken by input order.
pub fn best_matches<'a>(
    probe: &ProbeFingerprint,
    candidates: &'a [CandidateFingerprint],
    top_k: usize,
) -> Vec<(&'a CandidateFingerprint, f64)> {
    let mut scored: Vec<(usize, &CandidateFingerprint, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c, score_fingerprint(probe, c)))
        .collect();
    scored.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored
        .into_iter()
        .take(top_k)
        .map(|(_, c, score)| (c, score))
        .collect()
}

/// Matcher with an optional score cache keyed by (probe hash, provider,
/// reference).
pub struct HashMatcher {
    cache: Option<TtlCache<f64>>,
}

impl Default for HashMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HashMatcher {
    pub fn new() -> Self {
        Self { cache: None }
    }

    pub fn with_cache(ttl: Duration) -> Self {
        Self {
            cache: Some(TtlCache::new(ttl)),
        }
    }

    fn cache_key(probe: &ProbeFingerprint, candidate: &CandidateFingerprint) -> String {
        format!(
            "{}::{}::{}",
            probe.hash, candidate.provider, candidate.reference
        )
    }

    pub fn score(&self, probe: &ProbeFingerprint, candidate: &CandidateFingerprint) -> f64 {
        if let Some(cache) = &self.cache {
            let key = Self::cache_key(probe, candidate);
            if let Some(score) = cache.get(&key) {
                return score;
            }
            let score = score_fingerprint(probe, candidate);
            cache.set(&key, score);
            return score;
        }
        score_fingerprint(probe, candidate)
    }

    pub fn best<'a>(
        &self,
        probe: &ProbeFingerprint,
        candidates: &'a [CandidateFingerprint],
        top_k: usize,
    ) -> Vec<(&'a CandidateFingerprint, f64)> {
        let mut scored: Vec<(usize, &CandidateFingerprint, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c, self.score(probe, c)))
            .collect();
        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, c, score)| (c, score))
            .collect()
    }
}
