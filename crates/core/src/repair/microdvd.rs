//! MicroDVD frame-cue detection and conversion to SRT.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::srt::format_timestamp;

static FRAME_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{(\d+)\}\{(\d+)\}(.*)$").unwrap());
static FPS_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{1\}\{1\}(\d+(?:[\.,]\d+)?)$").unwrap());

/// Whether text looks like a MicroDVD file: at least two frame-cue lines,
/// ignoring an optional `{1}{1}<fps>` header.
pub fn looks_like_microdvd(text: &str) -> bool {
    let mut count = 0;
    for (i, line) in text.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
        if i == 0 && FPS_HEADER_RE.is_match(line) {
            continue;
        }
        if FRAME_LINE_RE.is_match(line) {
            count += 1;
            if count >= 2 {
                return true;
            }
        }
    }
    // A single cue still counts when it is the only content line.
    count == 1 && text.lines().filter(|l| !l.trim().is_empty()).count() == 1
}

/// Frame-rate marker embedded in the first line, like `{1}{1}23.976`.
pub fn header_fps(text: &str) -> Option<f32> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let caps = FPS_HEADER_RE.captures(first)?;
    caps[1].replace(',', ".").parse::<f32>().ok().filter(|f| *f > 0.0)
}

/// Convert MicroDVD `{start}{end}Text` cues into SRT using the given
/// frame rate.
///
/// `|` separates lines within one cue. The fps header cue is dropped, an
/// end frame at or before the start is nudged one second forward, and
/// unparseable lines are dropped rather than fatal.
pub fn microdvd_to_srt(text: &str, fps: f32) -> String {
    if fps <= 0.0 {
        return String::new();
    }

    let frame_to_ms = |frame: u64| ((frame as f64 / fps as f64) * 1000.0).round() as u64;

    let mut out: Vec<String> = Vec::new();
    let mut index = 1u32;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = FRAME_LINE_RE.captures(line) else {
            continue;
        };
        let Ok(start) = caps[1].parse::<u64>() else {
            continue;
        };
        let Ok(end) = caps[2].parse::<u64>() else {
            continue;
        };
        let body = caps[3].replace('|', "\n");
        let body = body.trim();

        // The fps marker encoded as a normal first cue.
        if start == 1 && end == 1 && body.replace(',', ".").parse::<f64>().is_ok() {
            continue;
        }
        if body.is_empty() {
            continue;
        }

        let end = if end <= start {
            start + fps.round() as u64
        } else {
            end
        };

        out.push(index.to_string());
        out.push(format!(
            "{} --> {}",
            format_timestamp(frame_to_ms(start)),
            format_timestamp(frame_to_ms(end))
        ));
        out.extend(body.lines().map(str::to_string));
        out.push(String::new());
        index += 1;
    }

    if out.is_empty() {
        return String::new();
    }
    let mut result = out.join("\n");
    while result.ends_with('\n') {
        result.pop();
    }
    result.push('\n');
    result
}
