//! Subtitle extraction from downloaded archives.

use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::debug;

/// Extensions recognized as text subtitles.
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "sub", "ssa", "ass", "smi", "txt"];

/// Member preference when an archive contains several subtitle files.
const PREFERENCE: &[&str] = &["srt", "sub", "txt", "ass", "ssa", "smi"];

/// A downloaded archive did not yield a usable subtitle.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("archive does not contain a usable subtitle file")]
    NoSubtitleMember,

    #[error("unsupported subtitle container: {0}")]
    UnsupportedContainer(String),

    #[error("failed to read archive: {0}")]
    Archive(String),
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn is_subtitle(name: &str) -> bool {
    extension(name)
        .map(|ext| SUBTITLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Entries claiming a time-coded-text extension must actually contain cue
/// separators; VobSub streams and renamed junk inside otherwise valid
/// archives are skipped, not fatal.
fn has_plausible_cues(name: &str, bytes: &[u8]) -> bool {
    let ext = extension(name).unwrap_or_default();
    if ext != "srt" && ext != "sub" {
        return true;
    }
    let head: String = String::from_utf8_lossy(&bytes[..bytes.len().min(8192)]).into_owned();
    if head.contains("-->") {
        return true;
    }
    // MicroDVD frame cues: {123}{456}Text
    let mut chars = head.split('{');
    chars.next();
    let frame_cues = chars
        .filter(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            !digits.is_empty() && part[digits.len()..].starts_with('}')
        })
        .count();
    frame_cues >= 2
}

/// Rank archive members: preferred subtitle extensions first, then input
/// order.
fn pick_order(names: &[String]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..names.len()).collect();
    order.sort_by_key(|&i| {
        let ext = extension(&names[i]).unwrap_or_default();
        PREFERENCE
            .iter()
            .position(|p| *p == ext)
            .unwrap_or(PREFERENCE.len())
    });
    order
}

/// Extract a subtitle file from a raw download.
///
/// A bare subtitle file passes through untouched. Zip and gzip containers
/// are opened in memory; rar/7z need helper binaries the engine cannot
/// assume and are rejected by name.
pub fn extract_subtitle(data: &[u8], original_name: &str) -> Result<(String, Vec<u8>), ExtractionError> {
    if is_subtitle(original_name) {
        return Ok((basename(original_name), data.to_vec()));
    }

    match extension(original_name).as_deref() {
        Some("zip") => extract_from_zip(data),
        Some("gz") => {
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut bytes = Vec::new();
            decoder
                .read_to_end(&mut bytes)
                .map_err(|e| ExtractionError::Archive(e.to_string()))?;
            let inner = basename(original_name.trim_end_matches(".gz"));
            if inner.is_empty() || !is_subtitle(&inner) {
                return Err(ExtractionError::NoSubtitleMember);
            }
            Ok((inner, bytes))
        }
        Some(ext @ ("rar" | "7z")) => Err(ExtractionError::UnsupportedContainer(ext.to_string())),
        _ => Err(ExtractionError::UnsupportedContainer(
            original_name.to_string(),
        )),
    }
}

fn extract_from_zip(data: &[u8]) -> Result<(String, Vec<u8>), ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ExtractionError::Archive(e.to_string()))?;

    let mut names: Vec<String> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractionError::Archive(e.to_string()))?;
        if !entry.is_dir() {
            names.push(entry.name().to_string());
        }
    }

    let candidates: Vec<String> = names.iter().filter(|n| is_subtitle(n)).cloned().collect();
    if candidates.is_empty() {
        return Err(ExtractionError::NoSubtitleMember);
    }

    for index in pick_order(&candidates) {
        let name = &candidates[index];
        let mut entry = archive
            .by_name(name)
            .map_err(|e| ExtractionError::Archive(e.to_string()))?;
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| ExtractionError::Archive(e.to_string()))?;

        if !has_plausible_cues(name, &bytes) {
            debug!(member = %name, "skipping archive member without cue separators");
            continue;
        }
        return Ok((basename(name), bytes));
    }

    Err(ExtractionError::NoSubtitleMember)
}
