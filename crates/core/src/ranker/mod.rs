//! Candidate deduplication and ranking.
//!
//! Scoring is a weighted linear model over named release signals
//! (`ScoreWeights`), computed by a pure function so every feature can be
//! unit-tested in isolation. Selection enforces per-provider caps, an
//! optional global cap, intra-provider duplicate collapsing and a
//! provider-diversity floor.

mod features;
mod score;
mod select;
mod tokens;

pub use features::{PlayerContext, ReleaseAttributes, ScoreWeights};
pub use score::{score_candidate, soft_match_score};
pub use select::{dedupe_candidates, filter_by_year, rank_and_select, ScoredCandidate};
pub use tokens::{
    dedupe_signature, extract_comments, extract_downloads, extract_groups, parse_release_tokens,
};
