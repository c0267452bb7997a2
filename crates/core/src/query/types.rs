//! Types for query normalization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of media a lookup is for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Series,
}

/// Which catalog an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Imdb,
    Tmdb,
    Tvdb,
}

/// A parsed media identifier.
///
/// Identifiers arrive in several shapes, possibly URL-encoded once or twice:
/// `tt0369179`, `tt0369179:1:2` (series S01E02), `tmdb:550`, `tvdb:81189:2:5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaId {
    pub catalog: Catalog,
    /// Catalog-native token: `tt0369179`, `550`, `81189`.
    pub base: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// Optional caller-supplied context for normalization.
///
/// `title`/`year` carry authoritative catalog metadata when the caller has
/// it; `filename` is the name of the file the player is showing and feeds
/// the fallback heuristics.
#[derive(Debug, Clone, Default)]
pub struct QueryHints {
    pub title: Option<String>,
    pub year: Option<u16>,
    pub filename: Option<String>,
}

/// Canonical search query. Created once per incoming lookup; immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub kind: MediaKind,
    /// Canonical title text, already cleaned of release noise.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    /// Lower-cased alphanumeric token string for fuzzy containment checks.
    pub fragment: String,
    /// Catalog id the query was built from, when one was usable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
}

impl SearchQuery {
    /// Canonical free-text form: `Title` or `Title 01x02` for episodes.
    /// Providers without their own normalization search with this.
    pub fn canonical_text(&self) -> String {
        match (self.season, self.episode) {
            (Some(s), Some(e)) if s > 0 => format!("{} {:02}x{:02}", self.title, s, e),
            _ => self.title.clone(),
        }
    }

    /// Key identifying this query in caches and the breaker.
    pub fn cache_key(&self) -> String {
        let year = self.year.map(|y| y.to_string()).unwrap_or_default();
        format!("{}::{}", self.canonical_text(), year)
    }
}

/// Errors from query normalization.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    /// Neither authoritative metadata nor any usable hint exists. The
    /// caller must treat the lookup as unresolvable (empty result, cached
    /// negatively).
    #[error("no usable query could be built from the identifier or hints")]
    Unresolvable,
}
