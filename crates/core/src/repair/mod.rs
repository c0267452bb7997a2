//! Content repair pipeline.
//!
//! Takes the raw payload a provider served (often an archive, in an
//! arbitrary legacy encoding, with broken timing structures) and produces a
//! clean UTF-8 subtitle file: archive member extraction, charset detection
//! and transcoding, control/markup stripping, MicroDVD frame-to-timecode
//! conversion and SRT structural repair.

mod archive;
mod encoding;
mod microdvd;
mod srt;

pub use archive::{extract_subtitle, ExtractionError};
pub use encoding::{ensure_utf8, looks_textual};
pub use microdvd::{header_fps, looks_like_microdvd, microdvd_to_srt};
pub use srt::{repair_srt, sanitize_text};

use thiserror::Error;
use tracing::debug;

/// Frame rate assumed for MicroDVD files that carry no marker and for
/// which the player reported nothing.
pub const FALLBACK_FPS: f32 = 25.0;

const DEFAULT_FORMAT: &str = "srt";

/// A repaired, client-safe subtitle file.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedFile {
    pub name: String,
    pub content: Vec<u8>,
    /// Source encoding the payload was transcoded from.
    pub encoding: String,
    /// Normalized format tag: "srt", "txt", "ass", ...
    pub format: String,
}

/// Failure of the repair pipeline.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Binary or otherwise incompatible payload behind a text-subtitle
    /// extension (VobSub served as .sub, for instance).
    #[error("unsupported subtitle format ({0}); choose an SRT/MicroDVD variant")]
    UnsupportedFormat(String),
}

/// Run the full pipeline on a downloaded payload.
///
/// `fps_hint` is the player-reported frame rate, used for MicroDVD
/// conversion when the file itself carries no marker.
pub fn repair(
    raw: &[u8],
    original_name: &str,
    fps_hint: Option<f32>,
) -> Result<RepairedFile, RepairError> {
    let (name, content) = extract_subtitle(raw, original_name)?;

    let mut format = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| DEFAULT_FORMAT.to_string());

    if format == "sub" && !looks_textual(&content) {
        return Err(RepairError::UnsupportedFormat("VobSub/IDX".to_string()));
    }

    let (mut bytes, detected) = ensure_utf8(&content);
    let mut encoding = detected.unwrap_or_else(|| "utf-8".to_string());

    if format == "sub" {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if looks_like_microdvd(&text) {
            let fps = fps_hint
                .filter(|f| *f > 0.0)
                .or_else(|| header_fps(&text))
                .unwrap_or(FALLBACK_FPS);
            let converted = microdvd_to_srt(&text, fps);
            if !converted.is_empty() {
                debug!(fps, "converted MicroDVD payload to SRT");
                bytes = converted.into_bytes();
                encoding = "utf-8".to_string();
                format = "srt".to_string();
            }
        }
    }

    if format == "srt" || format == "txt" {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        bytes = sanitize_text(&text).into_bytes();
        encoding = "utf-8".to_string();
    }

    Ok(RepairedFile {
        name: sanitize_filename(&name, &format),
        content: bytes,
        encoding,
        format,
    })
}

/// Make a member or provider file name safe to hand to clients.
pub fn sanitize_filename(name: &str, format: &str) -> String {
    let stripped = encoding::strip_markup_tags(name);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut safe = String::with_capacity(collapsed.len());
    let mut last_was_sep = true;
    for c in collapsed.chars() {
        if c.is_alphanumeric() || c == '.' || c == '-' {
            safe.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            safe.push('_');
            last_was_sep = true;
        }
    }
    let safe = safe.trim_matches('_').to_string();

    let base = if safe.is_empty() {
        "subtitle".to_string()
    } else {
        safe
    };

    let suffix = format!(".{}", if format.is_empty() { DEFAULT_FORMAT } else { format });
    if base.to_lowercase().ends_with(&suffix) {
        base
    } else {
        format!("{base}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_repair_plain_srt_passthrough() {
        let repaired = repair(&fixtures::srt_bytes(), "movie.srt", None).unwrap();
        assert_eq!(repaired.format, "srt");
        assert_eq!(repaired.name, "movie.srt");
        let text = String::from_utf8(repaired.content).unwrap();
        assert!(text.contains("00:00:01,000 --> 00:00:02,500"));
    }

    #[test]
    fn test_repair_is_idempotent() {
        let messy = b"1\n00:00:01.000 -> 00:00:00,500\nLine\n\n\n7\n00:01:00,000 --> 00:01:02,000\nNext\n";
        let once = repair(messy, "movie.srt", None).unwrap();
        let twice = repair(&once.content, "movie.srt", None).unwrap();
        assert_eq!(once.content, twice.content);
    }

    #[test]
    fn test_repair_microdvd_conversion_uses_hint() {
        let sub = b"{0}{25}Hello\n";
        let repaired = repair(sub, "movie.sub", Some(25.0)).unwrap();
        assert_eq!(repaired.format, "srt");
        let text = String::from_utf8(repaired.content).unwrap();
        assert!(text.contains("00:00:00,000 --> 00:00:01,000"));
        assert!(text.contains("Hello"));
    }

    #[test]
    fn test_repair_rejects_binary_sub() {
        let mut binary = vec![0u8; 2048];
        binary[0] = 0x50; // arbitrary non-text leader
        let err = repair(&binary, "movie.sub", None).unwrap_err();
        assert!(matches!(err, RepairError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_repair_zip_archive() {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options: zip::write::SimpleFileOptions = Default::default();
            zip.start_file("subs/movie.srt", options).unwrap();
            zip.write_all(&fixtures::srt_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let repaired = repair(&buf, "subs.zip", None).unwrap();
        assert_eq!(repaired.format, "srt");
        assert_eq!(repaired.name, "movie.srt");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("My Subtitle (v2)!", "srt"),
            "My_Subtitle_v2.srt"
        );
        assert_eq!(sanitize_filename("movie.srt", "srt"), "movie.srt");
        assert_eq!(sanitize_filename("", "srt"), "subtitle.srt");
    }

    #[test]
    fn test_sanitize_filename_strips_markup() {
        let name = sanitize_filename("[COLOR red]Heat[/COLOR] [B]1995[/B]", "srt");
        assert_eq!(name, "Heat_1995.srt");
    }
}
