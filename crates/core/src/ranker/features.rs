//! Named scoring weights and the player-side matching context.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::tokens::{extract_groups, parse_release_tokens, CODEC_TOKENS, RES_TOKENS};
use crate::query::extract_year;

/// Weights of the candidate scoring model, one named field per signal.
///
/// Defaults preserve the tuning the heuristics shipped with; deployments
/// override individual fields through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    // Year
    pub year_exact: f32,
    pub year_near: f32,
    pub year_in_info: f32,

    // FPS closeness to the playing file
    pub fps_exact: f32,
    pub fps_close: f32,
    pub fps_loose: f32,
    pub fps_mismatch: f32,

    // Release token overlap
    pub resolution_match: f32,
    pub resolution_mismatch: f32,
    pub source_match: f32,
    pub source_dvdrip_vs_bluray: f32,
    pub source_dvdrip_vs_remux: f32,
    pub codec_match: f32,

    // Release group
    pub group_generic_match: f32,
    pub group_generic_mismatch: f32,
    pub group_known_match: f32,
    pub group_known_mismatch: f32,
    pub group_partial: f32,

    // Flags and editions
    pub flags_match: f32,
    pub edition_match: f32,
    pub edition_mismatch: f32,
    pub edition_missing: f32,

    // Popularity
    pub downloads_cap: f32,
    pub comments_cap: f32,
    pub rating_multiplier: f32,

    // Global penalties/bonuses
    pub bundle_penalty: f32,
    pub poor_source_penalty: f32,
    pub info_length_bonus_cap: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            year_exact: 80.0,
            year_near: 12.0,
            year_in_info: 25.0,
            fps_exact: 40.0,
            fps_close: 22.0,
            fps_loose: 10.0,
            fps_mismatch: -15.0,
            resolution_match: 10.0,
            resolution_mismatch: -6.0,
            source_match: 6.0,
            source_dvdrip_vs_bluray: -12.0,
            source_dvdrip_vs_remux: -12.0,
            codec_match: 5.0,
            group_generic_match: 16.0,
            group_generic_mismatch: -8.0,
            group_known_match: 14.0,
            group_known_mismatch: -7.0,
            group_partial: 8.0,
            flags_match: 3.0,
            edition_match: 8.0,
            edition_mismatch: -5.0,
            edition_missing: -3.0,
            downloads_cap: 10.0,
            comments_cap: 8.0,
            rating_multiplier: 1.5,
            bundle_penalty: -18.0,
            poor_source_penalty: -25.0,
            info_length_bonus_cap: 0.5,
        }
    }
}

/// Release attributes parsed from a release name; the structured form used
/// by the strict filter and the soft-match pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseAttributes {
    pub source: Option<String>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub group: Option<String>,
    pub year: Option<u16>,
}

impl ReleaseAttributes {
    /// Parse attributes from a release name or info line.
    pub fn parse(text: &str) -> Self {
        let tokens = parse_release_tokens(text);
        let pick = |table: &[&str]| {
            table
                .iter()
                .find(|t| tokens.contains(**t))
                .map(|t| t.to_string())
        };

        // Remux outranks bluray when both appear in one name.
        let source = ["remux", "bluray", "webdl", "webrip", "hdtv", "dvdrip"]
            .iter()
            .find(|t| tokens.contains(**t))
            .map(|t| t.to_string());

        Self {
            source,
            resolution: pick(RES_TOKENS),
            codec: pick(CODEC_TOKENS),
            group: extract_groups(text).into_iter().next(),
            year: extract_year(text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.resolution.is_none()
            && self.codec.is_none()
            && self.group.is_none()
            && self.year.is_none()
    }
}

/// Whether two codec names belong to the same family (x265/hevc, x264/h264).
pub(crate) fn same_codec_family(a: &str, b: &str) -> bool {
    let a = a.to_lowercase().replace('.', "");
    let b = b.to_lowercase().replace('.', "");
    if a == b {
        return true;
    }
    let pair = (a.as_str(), b.as_str());
    matches!(
        pair,
        ("hevc", "x265") | ("x265", "hevc") | ("h265", "x265") | ("x265", "h265")
            | ("h265", "hevc") | ("hevc", "h265") | ("h264", "x264") | ("x264", "h264")
    )
}

/// What we know about the file the player is showing: fps plus release
/// tokens and groups derived from its filename.
#[derive(Debug, Clone, Default)]
pub struct PlayerContext {
    /// Player-reported frames per second; 0.0 when unknown.
    pub fps: f32,
    pub tokens: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub release: ReleaseAttributes,
}

impl PlayerContext {
    pub fn new(filename: Option<&str>, fps: Option<f32>) -> Self {
        let filename = filename.unwrap_or_default();
        Self {
            fps: fps.unwrap_or(0.0).max(0.0),
            tokens: parse_release_tokens(filename),
            groups: extract_groups(filename),
            release: ReleaseAttributes::parse(filename),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fps <= 0.0 && self.tokens.is_empty() && self.groups.is_empty()
    }
}
