//! Release-token parsing from free-form subtitle descriptions.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::provider::Candidate;

pub(crate) const RES_TOKENS: &[&str] = &["2160p", "1080p", "720p", "480p"];
pub(crate) const SRC_TOKENS: &[&str] = &["bluray", "remux", "webdl", "webrip", "hdtv", "dvdrip"];
pub(crate) const CODEC_TOKENS: &[&str] = &["x264", "x265", "h264", "h265", "hevc", "av1"];
pub(crate) const FLAG_TOKENS: &[&str] = &[
    "hdr10", "hdr", "dolbyvision", "dovi", "10bit", "atmos", "truehd", "dts",
];
pub(crate) const EDITION_TOKENS: &[&str] =
    &["directorscut", "extended", "unrated", "remaster", "remastered"];

struct TokenPattern {
    regex: Regex,
    normalize: fn(&str) -> String,
}

static TOKEN_PATTERNS: Lazy<Vec<TokenPattern>> = Lazy::new(|| {
    fn lower(s: &str) -> String {
        s.to_lowercase()
    }
    fn lower_no_space(s: &str) -> String {
        s.to_lowercase().replace([' ', '-'], "")
    }
    fn lower_no_dot(s: &str) -> String {
        s.to_lowercase().replace('.', "")
    }
    fn dvdrip(_: &str) -> String {
        "dvdrip".to_string()
    }
    fn edition(s: &str) -> String {
        s.to_lowercase().replace(['\'', ' ', '-'], "")
    }

    vec![
        // Resolution
        TokenPattern {
            regex: Regex::new(r"(?i)\b(2160p|1080p|720p|480p)\b").unwrap(),
            normalize: lower,
        },
        // Sources
        TokenPattern {
            regex: Regex::new(r"(?i)\b(blu[- ]?ray|remux|web[- ]?dl|webrip|hdtv)\b").unwrap(),
            normalize: lower_no_space,
        },
        // Codec
        TokenPattern {
            regex: Regex::new(r"(?i)\b(x264|x265|h\.?264|h\.?265|hevc|av1)\b").unwrap(),
            normalize: lower_no_dot,
        },
        // Rip/source variants
        TokenPattern {
            regex: Regex::new(r"(?i)\b(dvd\s*rip|bd\s*rip|b\s*rip|br\s*rip)\b").unwrap(),
            normalize: dvdrip,
        },
        // Release edition flags
        TokenPattern {
            regex: Regex::new(r"(?i)\b(director'?s\s*cut|extended|unrated|remaster(?:ed)?)\b")
                .unwrap(),
            normalize: edition,
        },
        // Flags
        TokenPattern {
            regex: Regex::new(r"(?i)\b(hdr10\+?|hdr|dolby\s*vision|dovi|10bit|atmos|truehd|dts)\b")
                .unwrap(),
            normalize: lower_no_space,
        },
        // Group (suffix before optional extension: -GROUP or .GROUP)
        TokenPattern {
            regex: Regex::new(r"[\-\._]([A-Za-z][A-Za-z0-9]{1,11})(?:\.[A-Za-z0-9]{2,4})?$")
                .unwrap(),
            normalize: lower,
        },
    ]
});

static GROUP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"[\-\._]([A-Za-z][A-Za-z0-9]{1,11})(?:\.[A-Za-z0-9]{2,4})?$").unwrap(),
        Regex::new(r"(?i)(?:x26[45]|h\.?26[45]|hevc)[\-\._]?([A-Za-z][A-Za-z0-9]{1,11})").unwrap(),
        Regex::new(r"(?i)\bby\s+([A-Za-z][A-Za-z0-9]{1,11})\b").unwrap(),
    ]
});

/// Release groups seen often enough to match by name when generic group
/// extraction finds nothing on one side.
static KNOWN_GROUPS: &[&str] = &[
    "rarbg", "tigole", "esir", "yts", "yify", "ctrlhd", "mkvcage", "evo", "ntb", "iamable", "qxr",
    "bone", "sinners", "din", "sparks", "amiable", "galaxyrg", "ettv", "fgt", "psa",
];

/// Parse normalized release tokens out of free text.
pub fn parse_release_tokens(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    if text.is_empty() {
        return tokens;
    }
    for pattern in TOKEN_PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                tokens.insert((pattern.normalize)(m.as_str()));
            }
        }
    }
    tokens
}

fn is_noise_group(token: &str) -> bool {
    let t = token.to_lowercase();
    if t.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    RES_TOKENS.contains(&t.as_str())
        || SRC_TOKENS.contains(&t.as_str())
        || CODEC_TOKENS.contains(&t.as_str())
        || FLAG_TOKENS.contains(&t.as_str())
}

/// Extract likely release-group names from a release string.
///
/// Candidates sit near the end (before the extension), directly after the
/// codec, or follow a "by" credit.
pub fn extract_groups(text: &str) -> BTreeSet<String> {
    let mut groups = BTreeSet::new();
    if text.is_empty() {
        return groups;
    }
    for pattern in GROUP_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                if !is_noise_group(m.as_str()) {
                    groups.insert(m.as_str().to_lowercase());
                }
            }
        }
    }
    groups
}

/// Intersect a token set with the known-group list.
pub(crate) fn known_groups(tokens: &BTreeSet<String>) -> BTreeSet<String> {
    tokens
        .iter()
        .filter(|t| KNOWN_GROUPS.contains(&t.as_str()))
        .cloned()
        .collect()
}

static DOWNLOADS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:downloads|dl)\s*[:：]?\s*(\d+)").unwrap());
static COMMENTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bcomments?\s*[:：]\s*(\d+)").unwrap());

/// Pull a download count out of a provider's info text.
pub fn extract_downloads(info: &str) -> u32 {
    DOWNLOADS_RE
        .captures(info)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Pull a comment count out of a provider's info text.
pub fn extract_comments(info: &str) -> u32 {
    COMMENTS_RE
        .captures(info)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Signature treating entries with identical fps + token set as duplicates
/// within one provider. Empty when the entry has no distinguishing marks.
pub fn dedupe_signature(candidate: &Candidate) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(fps) = candidate.fps.filter(|f| *f > 0.0) {
        parts.push(format!("fps:{fps:.2}"));
    }
    let tokens = parse_release_tokens(&candidate.info);
    if !tokens.is_empty() {
        parts.push(format!(
            "t:{}",
            tokens.iter().cloned().collect::<Vec<_>>().join(",")
        ));
    }
    parts.join("|")
}
