//! Candidate dedup and final selection.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::features::{same_codec_family, PlayerContext, ReleaseAttributes, ScoreWeights};
use super::score::{score_candidate, soft_match_score};
use super::tokens::{dedupe_signature, parse_release_tokens};
use crate::config::{SelectionConfig, StrictConfig};
use crate::provider::Candidate;
use crate::query::SearchQuery;

/// A candidate with its score and original fan-out position.
/// Exists only during ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f32,
    pub index: usize,
}

/// Remove duplicate candidates by (provider, reference), keeping the first
/// occurrence. Fan-out order is otherwise irrelevant to correctness.
pub fn dedupe_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.provider.clone(), c.reference.clone())))
        .collect()
}

/// Prefer entries that explicitly match the release year; keep everything
/// when nothing does.
pub fn filter_by_year(candidates: Vec<Candidate>, target_year: Option<u16>) -> Vec<Candidate> {
    let Some(year) = target_year else {
        return candidates;
    };
    let year_text = year.to_string();

    let filtered: Vec<Candidate> = candidates
        .iter()
        .filter(|c| c.year == Some(year) || c.info.contains(&year_text))
        .cloned()
        .collect();

    if filtered.is_empty() {
        candidates
    } else {
        filtered
    }
}

/// Name used for release-attribute parsing: provider file name when the
/// adapter supplied one, otherwise the free-form info text.
fn display_name(candidate: &Candidate) -> &str {
    candidate
        .extra
        .get("file_name")
        .map(String::as_str)
        .filter(|n| !n.is_empty())
        .unwrap_or(&candidate.info)
}

/// Strict release filter: reject candidates whose known release attributes
/// contradict the playing file.
fn passes_strict(candidate: &Candidate, ctx: &PlayerContext, strict: &StrictConfig) -> bool {
    let attrs = ReleaseAttributes::parse(display_name(candidate));

    if strict.source {
        if let (Some(vs), Some(ss)) = (&ctx.release.source, &attrs.source) {
            if vs != ss {
                return false;
            }
        }
    } else if matches!(ctx.release.source.as_deref(), Some("bluray") | Some("remux")) {
        // Even without the strict flag, drop clear downgrades.
        let tokens = parse_release_tokens(&candidate.info);
        if tokens.contains("dvdrip") {
            return false;
        }
    }

    if strict.resolution {
        if let (Some(vr), Some(sr)) = (&ctx.release.resolution, &attrs.resolution) {
            if vr != sr {
                return false;
            }
        }
    }

    if strict.codec {
        if let (Some(vc), Some(sc)) = (&ctx.release.codec, &attrs.codec) {
            if !same_codec_family(vc, sc) {
                return false;
            }
        }
    }

    if strict.group && !ctx.groups.is_empty() {
        let entry_groups = super::tokens::extract_groups(display_name(candidate));
        if ctx.groups.intersection(&entry_groups).next().is_none() {
            return false;
        }
    }

    if strict.fps {
        let entry_fps = candidate.fps.unwrap_or(0.0);
        if ctx.fps > 0.0 && entry_fps > 0.0 && (ctx.fps - entry_fps).abs() > 0.5 {
            return false;
        }
    }

    true
}

/// Order scored candidates by soft release-attribute similarity, with the
/// base score as secondary key.
fn soft_reorder(scored: Vec<ScoredCandidate>, ctx: &PlayerContext) -> Vec<ScoredCandidate> {
    let mut soft: Vec<(f32, ScoredCandidate)> = scored
        .into_iter()
        .map(|sc| {
            let attrs = ReleaseAttributes::parse(display_name(&sc.candidate));
            let (soft_score, _) = soft_match_score(&ctx.release, &attrs);
            (soft_score, sc)
        })
        .collect();
    soft.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.1.score
                    .partial_cmp(&a.1.score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.1.index.cmp(&b.1.index))
    });
    soft.into_iter().map(|(_, sc)| sc).collect()
}

/// Rank deduplicated candidates and select the final bounded,
/// provider-diverse result set in deterministic order.
pub fn rank_and_select(
    candidates: Vec<Candidate>,
    query: &SearchQuery,
    ctx: &PlayerContext,
    weights: &ScoreWeights,
    selection: &SelectionConfig,
) -> Vec<Candidate> {
    let deduped = dedupe_candidates(candidates);
    let preferred = filter_by_year(deduped, query.year);

    let mut scored: Vec<ScoredCandidate> = preferred
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| ScoredCandidate {
            score: score_candidate(&candidate, index, query.year, ctx, query.kind, weights),
            candidate,
            index,
        })
        .collect();

    // Score descending, original fan-out index as the stable tiebreak.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });

    // Strict pass: when enabled and at least one candidate qualifies, keep
    // only those. When it leaves nothing, optionally fall back to soft
    // attribute matching so inconsistent release naming does not produce an
    // empty list.
    if selection.strict.any_enabled() {
        let passing: Vec<ScoredCandidate> = scored
            .iter()
            .filter(|sc| passes_strict(&sc.candidate, ctx, &selection.strict))
            .cloned()
            .collect();
        if !passing.is_empty() {
            scored = passing;
        } else if selection.soft_match && !ctx.release.is_empty() {
            debug!("strict filter left nothing, falling back to soft match ordering");
            scored = soft_reorder(scored, ctx);
        }
    } else if selection.soft_match && !ctx.release.is_empty() {
        scored = soft_reorder(scored, ctx);
    }

    if selection.global_cap > 0 {
        select_global(&scored, selection.global_cap)
    } else {
        select_per_provider(&scored, selection)
    }
}

/// Global best-N across all providers, collapsing duplicate signatures.
///
/// The provider-diversity floor is folded into the cap: each non-empty
/// provider's best entry claims a slot first (best providers first), and
/// only the remaining slots go to runners-up by rank.
fn select_global(scored: &[ScoredCandidate], cap: usize) -> Vec<Candidate> {
    let mut seen_sigs: HashSet<String> = HashSet::new();
    let mut providers_seen: HashSet<&str> = HashSet::new();
    let mut picked: HashSet<usize> = HashSet::new();

    for (i, sc) in scored.iter().enumerate() {
        if picked.len() >= cap {
            break;
        }
        if !providers_seen.insert(sc.candidate.provider.as_str()) {
            continue;
        }
        let sig = dedupe_signature(&sc.candidate);
        if !sig.is_empty() && !seen_sigs.insert(sig) {
            continue;
        }
        picked.insert(i);
    }

    for (i, sc) in scored.iter().enumerate() {
        if picked.len() >= cap {
            break;
        }
        if picked.contains(&i) {
            continue;
        }
        let sig = dedupe_signature(&sc.candidate);
        if !sig.is_empty() && !seen_sigs.insert(sig) {
            continue;
        }
        picked.insert(i);
    }

    // `scored` is already rank-ordered, so index order is final order.
    let mut indices: Vec<usize> = picked.into_iter().collect();
    indices.sort_unstable();
    indices
        .into_iter()
        .map(|i| scored[i].candidate.clone())
        .collect()
}

/// Per-provider capped selection with intra-provider signature dedup.
fn select_per_provider(scored: &[ScoredCandidate], selection: &SelectionConfig) -> Vec<Candidate> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut seen_sigs: HashMap<String, HashSet<String>> = HashMap::new();
    let mut picks: Vec<Candidate> = Vec::new();

    for sc in scored {
        let provider = sc.candidate.provider.as_str();
        let cap = if selection.uncapped_providers.iter().any(|p| p == provider) {
            usize::MAX
        } else {
            selection.per_provider_cap.max(1)
        };

        let count = counts.entry(provider.to_string()).or_insert(0);
        if *count >= cap {
            continue;
        }

        let sig = dedupe_signature(&sc.candidate);
        if !sig.is_empty() {
            let seen = seen_sigs.entry(provider.to_string()).or_default();
            if !seen.insert(sig) {
                // Duplicate release within the same provider; the
                // higher-scored copy is already selected.
                continue;
            }
        }

        picks.push(sc.candidate.clone());
        *count += 1;
    }
    picks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MediaKind;

    fn make_candidate(provider: &str, reference: &str, info: &str) -> Candidate {
        Candidate {
            provider: provider.to_string(),
            reference: reference.to_string(),
            info: info.to_string(),
            ..Default::default()
        }
    }

    fn make_query(year: Option<u16>) -> SearchQuery {
        SearchQuery {
            kind: MediaKind::Movie,
            title: "Heat".to_string(),
            year,
            season: None,
            episode: None,
            fragment: "heat".to_string(),
            catalog_id: None,
        }
    }

    fn run_select(candidates: Vec<Candidate>, selection: &SelectionConfig) -> Vec<Candidate> {
        rank_and_select(
            candidates,
            &make_query(None),
            &PlayerContext::default(),
            &ScoreWeights::default(),
            selection,
        )
    }

    #[test]
    fn test_dedupe_by_provider_and_reference() {
        let candidates = vec![
            make_candidate("a", "ref-1", "first"),
            make_candidate("a", "ref-1", "duplicate"),
            make_candidate("b", "ref-1", "different provider"),
            make_candidate("a", "ref-2", "different reference"),
        ];
        let deduped = dedupe_candidates(candidates);
        assert_eq!(deduped.len(), 3);
        // First occurrence wins.
        assert_eq!(deduped[0].info, "first");
    }

    #[test]
    fn test_filter_by_year_keeps_matches() {
        let mut old = make_candidate("a", "1", "classic 1963 release");
        old.year = Some(1963);
        let mut fresh = make_candidate("b", "2", "release");
        fresh.year = Some(2020);

        let filtered = filter_by_year(vec![old, fresh], Some(2020));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].provider, "b");
    }

    #[test]
    fn test_filter_by_year_falls_back_when_empty() {
        let candidates = vec![make_candidate("a", "1", "no year at all")];
        let filtered = filter_by_year(candidates.clone(), Some(2020));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_year_scenario_ranks_matching_year_first() {
        let mut old = make_candidate("a", "1", "classic edition");
        old.year = Some(1963);
        let mut fresh = make_candidate("b", "2", "current edition");
        fresh.year = Some(2020);

        let selection = SelectionConfig::default();
        let result = rank_and_select(
            vec![old, fresh],
            &make_query(Some(2020)),
            &PlayerContext::default(),
            &ScoreWeights::default(),
            &selection,
        );
        assert_eq!(result[0].provider, "b");
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let candidates = vec![
            make_candidate("a", "1", "release one 1080p"),
            make_candidate("b", "2", "release two 720p"),
            make_candidate("c", "3", "release three"),
        ];
        let selection = SelectionConfig {
            per_provider_cap: 2,
            ..Default::default()
        };
        let first = run_select(candidates.clone(), &selection);
        let second = run_select(candidates, &selection);

        let refs = |v: &[Candidate]| {
            v.iter()
                .map(|c| c.reference.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(refs(&first), refs(&second));
    }

    #[test]
    fn test_per_provider_cap() {
        let candidates = vec![
            make_candidate("a", "1", "a first"),
            make_candidate("a", "2", "a second"),
            make_candidate("a", "3", "a third"),
            make_candidate("b", "4", "b first"),
        ];
        let selection = SelectionConfig {
            per_provider_cap: 2,
            ..Default::default()
        };
        let result = run_select(candidates, &selection);

        let a_count = result.iter().filter(|c| c.provider == "a").count();
        assert!(a_count <= 2);
        assert!(result.iter().any(|c| c.provider == "b"));
    }

    #[test]
    fn test_uncapped_provider() {
        let candidates = vec![
            make_candidate("big", "1", "one"),
            make_candidate("big", "2", "two"),
            make_candidate("big", "3", "three"),
        ];
        let selection = SelectionConfig {
            per_provider_cap: 1,
            uncapped_providers: vec!["big".to_string()],
            ..Default::default()
        };
        let result = run_select(candidates, &selection);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_provider_diversity_floor() {
        // Provider "quiet" scores lower than all of "loud"'s entries but
        // still must appear in the selection.
        let mut loud1 = make_candidate("loud", "1", "great 2020 release");
        loud1.year = Some(2020);
        let mut loud2 = make_candidate("loud", "2", "another 2020 release");
        loud2.year = Some(2020);
        let quiet = make_candidate("quiet", "3", "plain");

        let selection = SelectionConfig {
            per_provider_cap: 2,
            ..Default::default()
        };
        let result = rank_and_select(
            vec![loud1, loud2, quiet],
            &make_query(Some(2020)),
            &PlayerContext::default(),
            &ScoreWeights::default(),
            &selection,
        );
        assert!(result.iter().any(|c| c.provider == "quiet"));
    }

    #[test]
    fn test_global_cap_prefers_provider_diversity() {
        // Provider "loud" has the two best entries, but with a global cap
        // of 2 the single entry from "quiet" still claims a slot.
        let loud1 = make_candidate("loud", "1", "best release with long description");
        let loud2 = make_candidate("loud", "2", "second release with long description");
        let quiet = make_candidate("quiet", "3", "x");

        let selection = SelectionConfig {
            global_cap: 2,
            ..Default::default()
        };
        let result = run_select(vec![loud1, loud2, quiet], &selection);

        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|c| c.provider == "loud"));
        assert!(result.iter().any(|c| c.provider == "quiet"));
    }

    #[test]
    fn test_global_cap_bounds_diversity_floor() {
        let mut candidates = Vec::new();
        for i in 0..5 {
            candidates.push(make_candidate(&format!("p{i}"), &i.to_string(), "entry"));
        }
        let selection = SelectionConfig {
            global_cap: 2,
            ..Default::default()
        };
        let result = run_select(candidates, &selection);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_intra_provider_signature_dedupe() {
        // Same provider, same fps + token set: only the better copy stays.
        let mut first = make_candidate("a", "1", "Movie 1080p BluRay");
        first.fps = Some(23.976);
        let mut copy = make_candidate("a", "2", "Movie 1080p BluRay");
        copy.fps = Some(23.976);
        let distinct = make_candidate("a", "3", "Movie 720p WEBRip");

        let selection = SelectionConfig {
            per_provider_cap: 10,
            ..Default::default()
        };
        let result = run_select(vec![first, copy, distinct], &selection);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_strict_fps_filter() {
        let ctx = PlayerContext {
            fps: 25.0,
            ..Default::default()
        };
        let mut matching = make_candidate("a", "1", "Movie");
        matching.fps = Some(25.0);
        let mut mismatched = make_candidate("b", "2", "Movie");
        mismatched.fps = Some(29.97);

        let selection = SelectionConfig {
            strict: StrictConfig {
                fps: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = rank_and_select(
            vec![matching, mismatched],
            &make_query(None),
            &ctx,
            &ScoreWeights::default(),
            &selection,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].provider, "a");
    }

    #[test]
    fn test_soft_match_fallback_on_empty_strict() {
        let ctx = PlayerContext::new(Some("Movie.2019.1080p.BluRay.x264-GRP.mkv"), Some(25.0));

        // Both candidates report an fps too far from the player's, so the
        // strict pass rejects everything; soft matching should then prefer
        // the closer release family instead of returning nothing.
        let mut close = make_candidate("a", "1", "Movie.2019.1080p.WEB-DL.x264");
        close.fps = Some(23.976);
        let mut far = make_candidate("b", "2", "Movie.2019.480p.HDTV");
        far.fps = Some(23.976);

        let selection = SelectionConfig {
            soft_match: true,
            strict: StrictConfig {
                fps: true,
                ..Default::default()
            },
            per_provider_cap: 2,
            ..Default::default()
        };
        let result = rank_and_select(
            vec![far.clone(), close.clone()],
            &make_query(None),
            &ctx,
            &ScoreWeights::default(),
            &selection,
        );
        assert_eq!(result[0].reference, close.reference);
    }
}
