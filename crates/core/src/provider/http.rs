//! Generic JSON-gateway provider backend.
//!
//! Deployments that keep their site scrapers behind a small HTTP gateway
//! register one `HttpProvider` per upstream source. The gateway speaks a
//! uniform JSON contract, so no site-specific parsing lives in the engine.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::query::SearchQuery;
use crate::token::TokenPayload;

use super::{Candidate, DownloadedFile, ProviderError, SubtitleProvider};

/// HTTP-backed provider adapter.
pub struct HttpProvider {
    id: String,
    client: Client,
    config: GatewayConfig,
}

impl HttpProvider {
    pub fn new(id: impl Into<String>, config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("failed to create HTTP client");

        Self {
            id: id.into(),
            client,
            config,
        }
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        let mut url = format!(
            "{}/providers/{}/search?apikey={}&query={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.id),
            urlencoding::encode(&self.config.api_key),
            urlencoding::encode(&self.normalize_query(query)),
        );

        if let Some(year) = query.year {
            url.push_str(&format!("&year={year}"));
        }
        if let (Some(season), Some(episode)) = (query.season, query.episode) {
            url.push_str(&format!("&season={season}&episode={episode}"));
        }
        if let Some(id) = &query.catalog_id {
            url.push_str(&format!("&id={}", urlencoding::encode(id)));
        }

        url
    }

    fn build_download_url(&self, payload: &TokenPayload) -> String {
        format!(
            "{}/providers/{}/download?apikey={}&reference={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.id),
            urlencoding::encode(&self.config.api_key),
            urlencoding::encode(&payload.reference),
        )
    }

    fn map_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Connection(e.to_string())
        } else {
            ProviderError::Api(e.to_string())
        }
    }
}

#[async_trait]
impl SubtitleProvider for HttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, ProviderError> {
        let url = self.build_search_url(query);
        debug!(provider = %self.id, "searching gateway");

        let response = self.client.get(&url).send().await.map_err(Self::map_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let gateway: GatewayResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        debug!(
            provider = %self.id,
            results = gateway.results.len(),
            "gateway search complete"
        );

        Ok(gateway
            .results
            .into_iter()
            .map(|r| Candidate {
                provider: self.id.clone(),
                reference: r.reference,
                info: r.info,
                year: r.year,
                fps: r.fps,
                rating: r.rating,
                downloads: r.downloads,
                comments: r.comments,
                extra: r.extra,
            })
            .collect())
    }

    async fn download(&self, payload: &TokenPayload) -> Result<DownloadedFile, ProviderError> {
        let url = self.build_download_url(payload);
        debug!(provider = %self.id, reference = %payload.reference, "downloading via gateway");

        let response = self.client.get(&url).send().await.map_err(Self::map_error)?;

        if !response.status().is_success() {
            return Err(ProviderError::Api(format!(
                "HTTP {} fetching subtitle",
                response.status()
            )));
        }

        let name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_attachment_filename)
            .or_else(|| {
                payload
                    .reference
                    .rsplit('/')
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "subtitle.srt".to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
            .to_vec();

        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "gateway returned an empty file".to_string(),
            ));
        }

        Ok(DownloadedFile { name, bytes })
    }
}

/// Pull the filename out of a `Content-Disposition` header value.
fn parse_attachment_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    })
}

// Gateway wire types.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    results: Vec<GatewayResult>,
}

#[derive(Debug, Deserialize)]
struct GatewayResult {
    reference: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    fps: Option<f32>,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    downloads: Option<u32>,
    #[serde(default)]
    comments: Option<u32>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}
