//! Test doubles and fixtures.
//!
//! `MockProvider` stands in for real subtitle sources in orchestrator,
//! resolver and service tests.

mod mock_provider;

pub use mock_provider::MockProvider;

/// Fixture helpers for building test data.
pub mod fixtures {
    use std::collections::BTreeMap;

    use crate::provider::Candidate;

    /// A minimal candidate.
    pub fn candidate(provider: &str, reference: &str, info: &str) -> Candidate {
        Candidate {
            provider: provider.to_string(),
            reference: reference.to_string(),
            info: info.to_string(),
            ..Default::default()
        }
    }

    /// A candidate with year and fps, as scraped listings usually carry.
    pub fn detailed_candidate(
        provider: &str,
        reference: &str,
        info: &str,
        year: u16,
        fps: f32,
    ) -> Candidate {
        Candidate {
            provider: provider.to_string(),
            reference: reference.to_string(),
            info: info.to_string(),
            year: Some(year),
            fps: Some(fps),
            ..Default::default()
        }
    }

    /// A well-formed SRT file as bytes.
    pub fn srt_bytes() -> Vec<u8> {
        b"1\n00:00:01,000 --> 00:00:02,500\nHello there.\n\n2\n00:00:03,000 --> 00:00:04,000\nGeneral Kenobi!\n"
            .to_vec()
    }

    /// A candidate whose extra payload carries a provider file name.
    pub fn candidate_with_file_name(
        provider: &str,
        reference: &str,
        info: &str,
        file_name: &str,
    ) -> Candidate {
        Candidate {
            provider: provider.to_string(),
            reference: reference.to_string(),
            info: info.to_string(),
            extra: BTreeMap::from([("file_name".to_string(), file_name.to_string())]),
            ..Default::default()
        }
    }
}
