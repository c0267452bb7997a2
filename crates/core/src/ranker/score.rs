//! Pure candidate scoring.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::features::{same_codec_family, PlayerContext, ReleaseAttributes, ScoreWeights};
use super::tokens::{
    extract_comments, extract_downloads, extract_groups, known_groups, parse_release_tokens,
    EDITION_TOKENS, FLAG_TOKENS,
};
use crate::provider::Candidate;
use crate::query::MediaKind;

const SOURCE_OVERLAP_TOKENS: &[&str] = &["bluray", "webdl", "webrip", "hdtv", "remux"];

static BUNDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(trilogy|pack|season)\b").unwrap());
static POOR_SOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(cam|telesync|ts|tc|dvdscr|screener|workprint|wp)\b").unwrap());

/// Score one candidate against the query year and player context.
///
/// Pure: same inputs always produce the same score. `index` is the
/// candidate's original fan-out position and acts as a deterministic
/// tiebreak (earlier wins).
pub fn score_candidate(
    candidate: &Candidate,
    index: usize,
    target_year: Option<u16>,
    ctx: &PlayerContext,
    kind: MediaKind,
    weights: &ScoreWeights,
) -> f32 {
    let mut score = 0.0f32;
    let info = candidate.info.as_str();

    // Year matching
    if let Some(target) = target_year {
        match candidate.year {
            Some(year) if year == target => score += weights.year_exact,
            Some(year) if year.abs_diff(target) == 1 => score += weights.year_near,
            _ => {}
        }
        if info.contains(&target.to_string()) {
            score += weights.year_in_info;
        }
    }

    // FPS closeness
    let entry_fps = candidate.fps.unwrap_or(0.0);
    if ctx.fps > 0.0 && entry_fps > 0.0 {
        let diff = (ctx.fps - entry_fps).abs();
        score += if diff <= 0.05 {
            weights.fps_exact
        } else if diff <= 0.5 {
            weights.fps_close
        } else if diff <= 1.0 {
            weights.fps_loose
        } else {
            weights.fps_mismatch
        };
    }

    // Release token overlap
    let entry_tokens = parse_release_tokens(info);
    if !ctx.tokens.is_empty() && !entry_tokens.is_empty() {
        let mut weight = 0.0f32;

        // Resolution match/mismatch
        let res_set = ["2160p", "1080p", "720p"];
        let stream_res = res_set.iter().find(|r| ctx.tokens.contains(**r));
        let entry_res = res_set.iter().find(|r| entry_tokens.contains(**r));
        if let (Some(sr), Some(er)) = (stream_res, entry_res) {
            weight += if sr == er {
                weights.resolution_match
            } else {
                weights.resolution_mismatch
            };
        }

        // Source tier
        if SOURCE_OVERLAP_TOKENS
            .iter()
            .any(|t| ctx.tokens.contains(*t) && entry_tokens.contains(*t))
        {
            weight += weights.source_match;
        }
        // Symmetric penalty for clear source mismatch
        if ctx.tokens.contains("bluray") && entry_tokens.contains("dvdrip") {
            weight += weights.source_dvdrip_vs_bluray;
        }
        if ctx.tokens.contains("remux") && entry_tokens.contains("dvdrip") {
            weight += weights.source_dvdrip_vs_remux;
        }

        // Codec
        if ["x264", "x265", "h264", "h265", "av1"]
            .iter()
            .any(|t| ctx.tokens.contains(*t) && entry_tokens.contains(*t))
        {
            weight += weights.codec_match;
        }

        // Group: generic extraction first (covers unknown groups), known
        // list as fallback.
        let entry_groups = extract_groups(info);
        if !ctx.groups.is_empty() && !entry_groups.is_empty() {
            weight += if ctx.groups.intersection(&entry_groups).next().is_some() {
                weights.group_generic_match
            } else {
                weights.group_generic_mismatch
            };
        } else {
            let stream_known = known_groups(&ctx.tokens);
            let entry_known = known_groups(&entry_tokens);
            if !stream_known.is_empty() && !entry_known.is_empty() {
                weight += if stream_known.intersection(&entry_known).next().is_some() {
                    weights.group_known_match
                } else {
                    weights.group_known_mismatch
                };
            } else if stream_known.iter().any(|g| entry_tokens.contains(g)) {
                weight += weights.group_partial;
            }
        }

        // Flags
        if FLAG_TOKENS
            .iter()
            .any(|t| ctx.tokens.contains(*t) && entry_tokens.contains(*t))
        {
            weight += weights.flags_match;
        }

        // Edition flags: prefer agreement, penalize disagreement when the
        // stream signals an edition.
        let stream_editions: Vec<&str> = EDITION_TOKENS
            .iter()
            .filter(|t| ctx.tokens.contains(**t))
            .copied()
            .collect();
        let entry_editions: Vec<&str> = EDITION_TOKENS
            .iter()
            .filter(|t| entry_tokens.contains(**t))
            .copied()
            .collect();
        if !stream_editions.is_empty() && !entry_editions.is_empty() {
            weight += if stream_editions == entry_editions {
                weights.edition_match
            } else {
                weights.edition_mismatch
            };
        } else if !stream_editions.is_empty() {
            weight += weights.edition_missing;
        }

        score += weight;
    }

    // Popularity signals, log-scaled
    let downloads = candidate
        .downloads
        .filter(|d| *d > 0)
        .unwrap_or_else(|| extract_downloads(info));
    if downloads > 0 {
        score += (((1 + downloads) as f32).log10() * 5.0).min(weights.downloads_cap);
    }

    let comments = candidate
        .comments
        .filter(|c| *c > 0)
        .unwrap_or_else(|| extract_comments(info));
    if comments > 0 {
        score += ((comments as f32).sqrt() * 1.2).min(weights.comments_cap);
    }

    if let Some(rating) = candidate.rating {
        score += rating * weights.rating_multiplier;
    }

    // Penalize bundles when a single movie was requested
    if kind == MediaKind::Movie && BUNDLE_RE.is_match(info) {
        score += weights.bundle_penalty;
    }
    // Penalize poor-quality/early sources explicitly
    if POOR_SOURCE_RE.is_match(info) {
        score += weights.poor_source_penalty;
    }

    // Small bonus for having some descriptive info
    if !info.is_empty() {
        score += (info.len().min(50) as f32) / 100.0;
    }

    score - index as f32 * 0.01
}

/// Flexible similarity between the playing file's release attributes and a
/// candidate's. Returns (score, reasons); used as a fallback ordering when
/// strict filtering leaves nothing.
pub fn soft_match_score(
    video: &ReleaseAttributes,
    sub: &ReleaseAttributes,
) -> (f32, Vec<&'static str>) {
    let mut reasons: Vec<&'static str> = Vec::new();
    if video.is_empty() || sub.is_empty() {
        return (0.0, reasons);
    }

    let mut score = 0.0f32;

    // Year proximity
    if video.year.is_some() && video.year == sub.year {
        score += 1.0;
        reasons.push("+year");
    }

    // Source family proximity along the quality ladder
    const RANK: &[&str] = &[
        "cam", "screener", "dvdrip", "webrip", "webdl", "hdtv", "bluray", "remux",
    ];
    let vpos = video.source.as_deref().and_then(|s| RANK.iter().position(|r| *r == s));
    let spos = sub.source.as_deref().and_then(|s| RANK.iter().position(|r| *r == s));
    if let (Some(v), Some(s)) = (vpos, spos) {
        let gain = 4_i32.saturating_sub((v as i32 - s as i32).abs()).max(0);
        score += gain as f32;
        reasons.push("+source");
    }
    if video.source.as_deref() == Some("bluray") && sub.source.as_deref() == Some("dvdrip") {
        score -= 1.0;
        reasons.push("-dvdrip_vs_bluray");
    }

    // Resolution proximity
    if let (Some(vres), Some(sres)) = (&video.resolution, &sub.resolution) {
        if vres == sres {
            score += 2.0;
            reasons.push("+res");
        } else if (vres.contains("1080") && sres.contains("720"))
            || (vres.contains("720") && sres.contains("1080"))
        {
            score += 1.0;
            reasons.push("+res~near");
        }
    }

    // Codec family
    if let (Some(vcodec), Some(scodec)) = (&video.codec, &sub.codec) {
        if same_codec_family(vcodec, scodec) {
            score += 2.0;
            reasons.push("+codec");
        }
    }

    // Group
    if video.group.is_some() && video.group == sub.group {
        score += 3.0;
        reasons.push("+group");
    }

    (score, reasons)
}
