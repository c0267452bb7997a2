//! External media probe client.
//!
//! Shells out to an ffprobe-compatible binary and combines its JSON output
//! with a first+last-segment content hash. The tool is a black box;
//! failures simply disable fingerprint matching for the request.

use std::io::SeekFrom;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tracing::debug;

use super::types::ProbeFingerprint;

const HASH_CHUNK_SIZE: u64 = 1 << 20;

/// Probe invocation failure.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run probe tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("probe tool exited with status {0}")]
    NonZeroExit(i32),

    #[error("failed to parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client for an ffprobe-compatible probe binary.
pub struct MediaProbe {
    binary: String,
}

impl Default for MediaProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaProbe {
    pub fn new() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probe a local media file into a fingerprint.
    pub async fn probe(&self, path: &Path) -> Result<ProbeFingerprint, ProbeError> {
        let output = Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::NonZeroExit(output.status.code().unwrap_or(-1)));
        }

        let payload: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let runtime_secs = payload
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);
        let size_bytes = payload
            .format
            .as_ref()
            .and_then(|f| f.size.as_deref())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let fps = extract_fps(&payload.streams);

        let hash = segment_hash(path).await?;

        debug!(runtime_secs, fps, "probed media file");

        Ok(ProbeFingerprint {
            hash,
            runtime_secs,
            fps,
            size_bytes,
        })
    }
}

/// Parse frame rates like "24000/1001" or "25".
fn parse_frame_rate(value: &str) -> Option<f32> {
    if let Some((numerator, denominator)) = value.split_once('/') {
        let numerator: f32 = numerator.parse().ok()?;
        let denominator: f32 = denominator.parse().ok()?;
        if denominator == 0.0 {
            return None;
        }
        return Some(numerator / denominator);
    }
    value.parse().ok()
}

fn extract_fps(streams: &[FfprobeStream]) -> f32 {
    streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .filter_map(|s| {
            s.r_frame_rate
                .as_deref()
                .or(s.avg_frame_rate.as_deref())
                .and_then(parse_frame_rate)
        })
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0)
}

/// Hash the first and last megabyte of the file. Small files hash their
/// single chunk twice, keeping the digest shape uniform.
async fn segment_hash(path: &Path) -> Result<String, std::io::Error> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let mut first = vec![0u8; HASH_CHUNK_SIZE.min(size) as usize];
    file.read_exact(&mut first).await?;

    let mut hasher = Sha256::new();
    hasher.update(&first);

    if size <= HASH_CHUNK_SIZE {
        hasher.update(&first);
    } else {
        file.seek(SeekFrom::Start(size - HASH_CHUNK_SIZE)).await?;
        let mut last = vec![0u8; HASH_CHUNK_SIZE as usize];
        file.read_exact(&mut last).await?;
        hasher.update(&last);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
}
