//! Types for the provider contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::SearchQuery;
use crate::token::TokenPayload;

/// A subtitle listing returned by a provider search.
///
/// Ephemeral: candidates are discarded after ranking unless selected.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Candidate {
    /// Id of the provider that produced this candidate.
    pub provider: String,
    /// Opaque source reference (url or provider-native id) used to download
    /// the file later.
    pub reference: String,
    /// Free-text descriptive info as shown on the source site.
    pub info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<u32>,
    /// Provider-specific fields carried into the download payload
    /// (e.g. a file id or preferred file name).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Raw bytes and suggested name returned by a provider download.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Errors a provider call can produce.
///
/// These are always contained at the orchestrator boundary: a failing
/// provider degrades the result set, it never fails the whole query.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider connection failed: {0}")]
    Connection(String),

    #[error("provider API error: {0}")]
    Api(String),

    #[error("provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Contract implemented by every subtitle source.
///
/// `search` is idempotent and side-effect-free besides network I/O.
/// `normalize_query` lets an adapter rewrite the query into the form its
/// site expects; the default falls back to the canonical query text.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Stable provider id used in candidates, tokens, caches and logs.
    fn id(&self) -> &str;

    /// Provider-specific query text. Sites wanting `S01E02` instead of the
    /// canonical `01x02` form override this.
    fn normalize_query(&self, query: &SearchQuery) -> String {
        query.canonical_text()
    }

    /// Search the source for candidates matching the query.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, ProviderError>;

    /// Download the raw file behind a previously returned reference.
    async fn download(&self, payload: &TokenPayload) -> Result<DownloadedFile, ProviderError>;
}

/// Rewrite `01x02`-style episode tokens into `S01E02` form.
///
/// Shared by adapters whose sites only understand the SxxExx convention.
pub fn to_sxxexx(text: &str) -> String {
    use once_cell::sync::Lazy;
    use regex_lite::Regex;

    static SERIES_TOKEN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(\d{1,2})x(\d{1,2})\b").unwrap());

    SERIES_TOKEN
        .replace_all(text, |caps: &regex_lite::Captures<'_>| {
            let season: u32 = caps[1].parse().unwrap_or(0);
            let episode: u32 = caps[2].parse().unwrap_or(0);
            format!("S{season:02}E{episode:02}")
        })
        .into_owned()
}
