//! Client-facing listing assembly: display names and filenames.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::provider::Candidate;
use crate::repair::sanitize_filename;

const MAX_DISPLAY_LEN: usize = 96;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://\S+|\bhttp/\S+|\bsearch\?q=\S+").unwrap());
static TRAILING_CREDIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+by\s+[^•|]+$").unwrap());
static COLOR_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[/?COLOR[^\]]*\]").unwrap());
static STYLE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[/?[BIU]\]").unwrap());

/// Short label shown in front of a listing: `subs_land` -> `Subs Land`.
pub fn provider_label(provider: &str) -> String {
    if provider.is_empty() {
        return "Unknown".to_string();
    }
    provider
        .split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_tags(text: &str) -> String {
    let stripped = COLOR_TAG_RE.replace_all(text, "");
    STYLE_TAG_RE.replace_all(&stripped, "").into_owned()
}

/// Condense a provider's info blob into one display line: the last
/// non-empty line with urls, search links, trailing credits and quotes
/// removed, capped at a readable length.
fn summarize_info(info: &str) -> String {
    let text = strip_tags(info).replace('\r', "\n");
    let last_line = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .next_back()
        .unwrap_or("");

    let cleaned = URL_RE.replace_all(last_line, "");
    let cleaned = TRAILING_CREDIT_RE.replace_all(&cleaned, "");
    let cleaned = cleaned.replace(['"', '\''], "");
    let mut cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.len() > MAX_DISPLAY_LEN {
        let mut cut = MAX_DISPLAY_LEN;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
        cleaned = format!("{}…", cleaned.trim_end_matches([' ', '.', '-', '_']));
    }
    cleaned
}

/// `[Label] summarized info`, falling back to a generic line.
pub fn build_display_name(candidate: &Candidate) -> String {
    let label = provider_label(&candidate.provider);
    let summary = summarize_info(&candidate.info);
    if summary.is_empty() {
        format!("[{label}] Subtitles")
    } else {
        format!("[{label}] {summary}")
    }
}

/// Safe listing filename derived from the candidate's info text.
pub fn build_filename(candidate: &Candidate, index: usize) -> String {
    let base = summarize_info(&candidate.info);
    let format = candidate
        .extra
        .get("file_name")
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| matches!(ext.as_str(), "srt" | "sub" | "txt" | "ass" | "ssa" | "smi"))
        .unwrap_or_else(|| "srt".to_string());

    if base.is_empty() {
        format!("subtitles_{index}.{format}")
    } else {
        sanitize_filename(&base, &format)
    }
}
