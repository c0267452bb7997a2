//! SRT structural repair: timecode normalization, end-time nudging and cue
//! renumbering.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::encoding::strip_markup_tags;

/// Render milliseconds as an SRT timestamp.
pub(crate) fn format_timestamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

/// Unify dash and arrow variants into the canonical ` --> ` separator.
fn normalize_arrow(line: &str) -> String {
    let s = line
        .replace(['–', '—'], "-")
        .replace("=>", "->")
        .replace(" - ", " -> ");
    // Collapse existing long arrows, then lengthen every arrow.
    s.replace("-->", "->").replace("->", "-->")
}

static HMS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3}):(\d{1,2}):(\d{1,2})$").unwrap());
static HMS_SEP_MS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}:\d{1,2}:\d{1,2})[:\s](\d{1,3})$").unwrap());
static MS_TAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}:\d{1,2})[\.,;:\s](\d{1,3})$").unwrap());
static MM_SS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").unwrap());
static SS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})(?:[\.,;:\s](\d{1,3}))?$").unwrap());

fn pad_ms(ms: &str) -> String {
    let mut padded = ms.to_string();
    while padded.len() < 3 {
        padded.push('0');
    }
    padded.truncate(3);
    padded
}

/// Convert a single timecode segment into `HH:MM:SS,mmm` punctuation,
/// tolerating missing milliseconds and `.`/`;`/`:`/space separators.
fn normalize_millis(segment: &str) -> String {
    let seg = segment.trim().replace('\u{a0}', " ");

    // HH:MM:SS without millis
    if let Some(caps) = HMS_RE.captures(&seg) {
        return format!(
            "{:02}:{:02}:{:02},000",
            caps[1].parse::<u32>().unwrap_or(0),
            caps[2].parse::<u32>().unwrap_or(0),
            caps[3].parse::<u32>().unwrap_or(0)
        );
    }

    // HH:MM:SS.mmm or HH:MM:SS;mmm
    if !seg.contains(',') && (seg.contains('.') || seg.contains(';')) {
        let delim = if seg.contains('.') { '.' } else { ';' };
        if let Some((head, tail)) = seg.rsplit_once(delim) {
            if tail.chars().all(|c| c.is_ascii_digit()) && (1..=3).contains(&tail.len()) {
                let head = head.replace(['.', ';'], ":");
                return format!("{head},{}", pad_ms(tail));
            }
        }
    }

    // HH:MM:SS:mmm or HH:MM:SS mmm
    if let Some(caps) = HMS_SEP_MS_RE.captures(&seg) {
        return format!("{},{}", &caps[1], pad_ms(&caps[2]));
    }

    // MM:SS with millis - add leading hours
    if let Some(caps) = MS_TAIL_RE.captures(&seg) {
        let head = caps[1].replace(['.', ';'], ":");
        return format!("00:{head},{}", pad_ms(&caps[2]));
    }

    // MM:SS without millis
    if let Some(caps) = MM_SS_RE.captures(&seg) {
        return format!(
            "00:{:02}:{:02},000",
            caps[1].parse::<u32>().unwrap_or(0),
            caps[2].parse::<u32>().unwrap_or(0)
        );
    }

    // Bare seconds, with or without millis
    if let Some(caps) = SS_RE.captures(&seg) {
        let ms = caps.get(2).map(|m| pad_ms(m.as_str())).unwrap_or_else(|| "000".to_string());
        return format!("00:00:{:02},{}", caps[1].parse::<u32>().unwrap_or(0), ms);
    }

    seg
}

static CANONICAL_TS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}):(\d{1,2}):(\d{1,2}),(\d{1,3})$").unwrap());
static TIMECODE_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^-]+?)\s*(?:-->|-)\s*(.+)$").unwrap());
static RIGHT_JUNK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}|\sX\d+:|\sALIGN|\sposition").unwrap());
static INDEX_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\s*$").unwrap());

/// Parse one segment into clamped `HH:MM:SS,mmm` form.
fn to_hms(segment: &str) -> Option<String> {
    let seg = normalize_millis(segment);
    let caps = CANONICAL_TS_RE.captures(&seg)?;
    let mut hh: u64 = caps[1].parse().ok()?;
    let mut mm: u64 = caps[2].parse().ok()?;
    let mut ss: u64 = caps[3].parse().ok()?;
    let ms = pad_ms(&caps[4]);

    // Carry overflowing minutes/seconds instead of rejecting the cue.
    if ss > 59 {
        mm += ss / 60;
        ss %= 60;
    }
    if mm > 59 {
        hh += mm / 60;
        mm %= 60;
    }
    Some(format!("{hh:02}:{mm:02}:{ss:02},{ms}"))
}

fn timestamp_ms(hms: &str) -> Option<u64> {
    let caps = CANONICAL_TS_RE.captures(hms)?;
    let hh: u64 = caps[1].parse().ok()?;
    let mm: u64 = caps[2].parse().ok()?;
    let ss: u64 = caps[3].parse().ok()?;
    let ms: u64 = caps[4].parse().ok()?;
    Some((hh * 3600 + mm * 60 + ss) * 1000 + ms)
}

/// Repair one timecode line, or `None` when it is not one.
///
/// Normalizes arrows and millisecond punctuation, strips trailing position
/// annotations, and nudges an end time that is not after its start by one
/// second.
fn parse_and_repair_timecode(line: &str) -> Option<String> {
    let s = normalize_arrow(line.trim());
    let caps = TIMECODE_SPLIT_RE.captures(&s)?;

    let left = caps[1].trim().to_string();
    let mut right = caps[2].trim().to_string();
    if let Some(m) = RIGHT_JUNK_RE.find(&right) {
        right.truncate(m.start());
    }

    let start = to_hms(&left)?;
    let mut end = to_hms(right.trim())?;

    if let (Some(start_ms), Some(end_ms)) = (timestamp_ms(&start), timestamp_ms(&end)) {
        if end_ms <= start_ms {
            end = format_timestamp(start_ms + 1000);
        }
    }

    Some(format!("{start} --> {end}"))
}

/// Rebuild an SRT file block by block: repaired timecodes, renumbered cue
/// indices, single blank separators. Returns empty when no block survives.
pub fn repair_srt(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let mut out: Vec<String> = Vec::new();
    let mut index = 1u32;
    let mut i = 0usize;

    while i < lines.len() {
        while i < lines.len() && lines[i].trim().is_empty() {
            i += 1;
        }
        if i >= lines.len() {
            break;
        }

        // Optional index line before the timecode.
        let mut time_line = i;
        if INDEX_LINE_RE.is_match(lines[i]) && i + 1 < lines.len() {
            time_line = i + 1;
        }

        let Some(timecode) = parse_and_repair_timecode(lines[time_line]) else {
            i += 1;
            continue;
        };

        out.push(index.to_string());
        out.push(timecode);
        index += 1;

        let mut j = time_line + 1;
        while j < lines.len() && !lines[j].trim().is_empty() {
            out.push(lines[j].to_string());
            j += 1;
        }
        out.push(String::new());
        i = j + 1;
    }

    let joined = out.join("\n");
    let trimmed = joined.trim_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// Baseline text normalization: BOM removal, LF line endings, control
/// character and legacy markup stripping, right-trimmed lines, single
/// trailing newline.
fn normalize_text(text: &str) -> String {
    let text = strip_markup_tags(text);
    let text = text.replace('\u{feff}', "").replace("\r\n", "\n").replace('\r', "\n");
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}'))
        .collect();

    let mut lines: Vec<&str> = cleaned.split('\n').map(str::trim_end).collect();
    while matches!(lines.last(), Some(l) if l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    format!("{}\n", lines.join("\n"))
}

/// Full text cleanup for time-coded text formats: normalize, then rebuild
/// the cue structure. When repair finds no block (plain .txt transcripts),
/// the normalized text is kept so output is never emptied by the repairer.
pub fn sanitize_text(text: &str) -> String {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return normalized;
    }
    let repaired = repair_srt(&normalized);
    if repaired.is_empty() {
        normalized
    } else {
        repaired
    }
}
