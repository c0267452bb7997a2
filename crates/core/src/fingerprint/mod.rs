//! Fingerprint-based subtitle-to-video matching.
//!
//! A probe fingerprint (content hash, runtime, frame rate) is produced by
//! an external ffprobe-compatible tool; candidate fingerprints are scored
//! against it when exact identification is needed. The matcher itself is
//! pure and usable standalone.

mod matcher;
mod probe;
mod types;

pub use matcher::{best_matches, score_fingerprint, HashMatcher};
pub use probe::{MediaProbe, ProbeError};
pub use types::*;
