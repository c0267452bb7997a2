//! Query normalization.
//!
//! Turns a heterogeneous media identifier (plus optional filename/title/year
//! hints) into a canonical `SearchQuery` for the fan-out orchestrator.

mod normalizer;
mod types;

pub use normalizer::{extract_year, normalize, parse_media_id, title_from_filename};
pub use types::*;
