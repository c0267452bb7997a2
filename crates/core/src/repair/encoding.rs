//! Charset detection, transcoding and text cleanup.

use chardetng::EncodingDetector;
use once_cell::sync::Lazy;
use regex_lite::Regex;

static COLOR_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[/?COLOR[^\]]*\]").unwrap());
static STYLE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[/?[BIU]\]").unwrap());

/// Detect the source encoding and transcode to UTF-8.
///
/// Returns the UTF-8 bytes and the detected encoding name; input that is
/// already valid UTF-8 passes through unchanged.
pub fn ensure_utf8(data: &[u8]) -> (Vec<u8>, Option<String>) {
    if data.is_empty() {
        return (Vec::new(), Some("utf-8".to_string()));
    }

    let mut detector = EncodingDetector::new();
    detector.feed(data, true);
    let encoding = detector.guess(None, true);

    let (text, _, had_errors) = encoding.decode(data);
    if had_errors {
        // Keep the raw bytes rather than serving replacement characters.
        return (data.to_vec(), None);
    }
    (
        text.into_owned().into_bytes(),
        Some(encoding.name().to_lowercase()),
    )
}

/// Strip legacy `[COLOR]`/`[B]`/`[I]`/`[U]` styling tags.
pub fn strip_markup_tags(text: &str) -> String {
    let stripped = COLOR_TAG_RE.replace_all(text, "");
    STYLE_TAG_RE.replace_all(&stripped, "").into_owned()
}

/// Whether a payload is plausibly a text subtitle.
///
/// NUL bytes beyond a trace mean a binary stream (VobSub). MicroDVD frame
/// cues are accepted outright; otherwise most of the head must be
/// printable, counting high bytes as text since legacy single-byte
/// encodings live above 0x7F.
pub fn looks_textual(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    let head = &data[..data.len().min(4096)];

    let nuls = head.iter().filter(|b| **b == 0).count();
    if nuls > 0 && (nuls as f32 / head.len() as f32) > 0.01 {
        return false;
    }

    static FRAME_CUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\d+\}\{\d+\}").unwrap());
    let sample = String::from_utf8_lossy(head);
    if FRAME_CUE_RE.is_match(&sample) {
        return true;
    }

    let printable = head
        .iter()
        .filter(|b| matches!(**b, 32..=126 | 9 | 10 | 13 | 128..=255))
        .count();
    (printable as f32 / head.len() as f32) >= 0.85
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        let input = "Здравей, свят!".as_bytes();
        let (bytes, encoding) = ensure_utf8(input);
        assert_eq!(bytes, input);
        assert_eq!(encoding.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_windows_1251_transcoding() {
        // "Здравей, как си днес? " in windows-1251, repeated so the
        // detector has enough signal.
        let sentence: &[u8] = &[
            0xC7, 0xE4, 0xF0, 0xE0, 0xE2, 0xE5, 0xE9, 0x2C, 0x20, 0xEA, 0xE0, 0xEA, 0x20, 0xF1,
            0xE8, 0x20, 0xE4, 0xED, 0xE5, 0xF1, 0x3F, 0x20,
        ];
        let cp1251: Vec<u8> = sentence.iter().copied().cycle().take(sentence.len() * 6).collect();

        let (bytes, encoding) = ensure_utf8(&cp1251);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Здравей"), "got: {text}");
        assert!(encoding.is_some());
    }

    #[test]
    fn test_latin1_transcoding() {
        // "café" in latin-1.
        let latin1: &[u8] = &[0x63, 0x61, 0x66, 0xE9, 0x20, 0x63, 0x61, 0x66, 0xE9];
        let (bytes, _) = ensure_utf8(latin1);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("caf"));
    }

    #[test]
    fn test_strip_markup_tags() {
        let input = "[COLOR yellow]Heat[/COLOR] [B]bold[/B] [I]italic[/I] [U]u[/U]";
        assert_eq!(strip_markup_tags(input), "Heat bold italic u");
    }

    #[test]
    fn test_strip_markup_keeps_plain_brackets() {
        assert_eq!(strip_markup_tags("[EN] subtitles"), "[EN] subtitles");
    }

    #[test]
    fn test_looks_textual_srt() {
        assert!(looks_textual(b"1\n00:00:01,000 --> 00:00:02,000\nHello\n"));
    }

    #[test]
    fn test_looks_textual_microdvd() {
        assert!(looks_textual(b"{0}{25}Hello\n{30}{60}World\n"));
    }

    #[test]
    fn test_looks_textual_high_byte_legacy_text() {
        // windows-1251 text is mostly high bytes but still text.
        let cp1251: Vec<u8> = std::iter::repeat([0xC7u8, 0xE4, 0xF0, 0x20])
            .take(64)
            .flatten()
            .collect();
        assert!(looks_textual(&cp1251));
    }

    #[test]
    fn test_binary_payload_rejected() {
        let mut vobsub = vec![0u8; 1024];
        vobsub[0] = 0x00;
        vobsub[512] = 0x1B;
        assert!(!looks_textual(&vobsub));
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(!looks_textual(b""));
    }
}
