//! Types for fingerprint matching.

use serde::{Deserialize, Serialize};

/// Fingerprint of the video file being played, as reported by the probe
/// tool.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProbeFingerprint {
    /// Content hash over the first and last segment of the file.
    pub hash: String,
    /// Runtime in seconds; 0.0 when unknown.
    pub runtime_secs: f64,
    /// Video frame rate; 0.0 when unknown.
    #[serde(default)]
    pub fps: f32,
    /// File size in bytes.
    #[serde(default)]
    pub size_bytes: u64,
}

/// Fingerprint of one subtitle candidate.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CandidateFingerprint {
    pub provider: String,
    /// Source reference the fingerprint belongs to.
    pub reference: String,
    /// Content hash of the video the subtitle was made for, when the
    /// provider exposes one. Empty when unknown.
    #[serde(default)]
    pub hash: String,
    /// Runtime in seconds covered by the subtitle; 0.0 when unknown.
    #[serde(default)]
    pub runtime_secs: f64,
    /// Cue list as (start_ms, end_ms) pairs.
    #[serde(default)]
    pub cues: Vec<(u64, u64)>,
}

impl CandidateFingerprint {
    /// Seconds from time zero to the first cue.
    pub fn start_offset_secs(&self) -> f64 {
        self.cues
            .first()
            .map(|(start, _)| *start as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}
