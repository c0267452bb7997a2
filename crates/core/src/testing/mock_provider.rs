//! Mock provider for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::{Candidate, DownloadedFile, ProviderError, SubtitleProvider};
use crate::query::SearchQuery;
use crate::token::TokenPayload;

/// Mock implementation of the `SubtitleProvider` trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable search results and download payloads
/// - Track search and download calls for assertions
/// - Simulate failures and delays
pub struct MockProvider {
    id: String,
    results: Mutex<Vec<Candidate>>,
    download: Mutex<Option<DownloadedFile>>,
    /// Error for the next search only; consumed on use.
    next_error: Mutex<Option<ProviderError>>,
    /// Error for every search, until cleared.
    persistent_error: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    download_delay: Mutex<Option<Duration>>,
    searches: Mutex<Vec<SearchQuery>>,
    search_calls: AtomicU32,
    download_calls: AtomicU32,
    failing_downloads: AtomicU32,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            results: Mutex::new(Vec::new()),
            download: Mutex::new(None),
            next_error: Mutex::new(None),
            persistent_error: Mutex::new(None),
            delay: Mutex::new(None),
            download_delay: Mutex::new(None),
            searches: Mutex::new(Vec::new()),
            search_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
            failing_downloads: AtomicU32::new(0),
        }
    }

    /// Set the candidates returned by subsequent searches.
    pub fn set_results(&self, results: Vec<Candidate>) {
        *self.results.lock().unwrap() = results;
    }

    /// Set the file returned by subsequent downloads.
    pub fn set_download(&self, name: &str, bytes: Vec<u8>) {
        *self.download.lock().unwrap() = Some(DownloadedFile {
            name: name.to_string(),
            bytes,
        });
    }

    /// Fail only the next search with the given error.
    pub fn fail_next(&self, error: ProviderError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// Fail every search until cleared.
    pub fn fail_always(&self, error: ProviderError) {
        *self.persistent_error.lock().unwrap() = Some(error.to_string());
    }

    pub fn clear_failures(&self) {
        *self.persistent_error.lock().unwrap() = None;
        *self.next_error.lock().unwrap() = None;
    }

    /// Fail the next `n` downloads with a connection error.
    pub fn fail_downloads(&self, n: u32) {
        self.failing_downloads.store(n, Ordering::SeqCst);
    }

    /// Delay every search by the given duration.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Delay every download by the given duration.
    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = Some(delay);
    }

    pub fn search_count(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> u32 {
        self.download_calls.load(Ordering::SeqCst)
    }

    /// Queries recorded from search calls.
    pub fn recorded_searches(&self) -> Vec<SearchQuery> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubtitleProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.searches.lock().unwrap().push(query.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        if let Some(reason) = self.persistent_error.lock().unwrap().clone() {
            return Err(ProviderError::Api(reason));
        }

        Ok(self.results.lock().unwrap().clone())
    }

    async fn download(&self, _payload: &TokenPayload) -> Result<DownloadedFile, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing_downloads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_downloads.fetch_sub(1, Ordering::SeqCst);
            return Err(ProviderError::Connection("mock download failure".to_string()));
        }

        self.download
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::InvalidResponse("no download configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MediaKind;
    use crate::testing::fixtures;

    fn make_query() -> SearchQuery {
        SearchQuery {
            kind: MediaKind::Movie,
            title: "Test".to_string(),
            year: None,
            season: None,
            episode: None,
            fragment: "test".to_string(),
            catalog_id: None,
        }
    }

    #[tokio::test]
    async fn test_search_returns_configured_results() {
        let provider = MockProvider::new("mock");
        provider.set_results(vec![fixtures::candidate("mock", "ref-1", "one")]);

        let results = provider.search(&make_query()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(provider.search_count(), 1);
        assert_eq!(provider.recorded_searches()[0].title, "Test");
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let provider = MockProvider::new("mock");
        provider.fail_next(ProviderError::Timeout);

        assert!(provider.search(&make_query()).await.is_err());
        assert!(provider.search(&make_query()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_always_persists() {
        let provider = MockProvider::new("mock");
        provider.fail_always(ProviderError::Api("down".to_string()));

        assert!(provider.search(&make_query()).await.is_err());
        assert!(provider.search(&make_query()).await.is_err());

        provider.clear_failures();
        assert!(provider.search(&make_query()).await.is_ok());
    }

    #[tokio::test]
    async fn test_download_counts_and_failures() {
        let provider = MockProvider::new("mock");
        provider.set_download("file.srt", b"content".to_vec());
        provider.fail_downloads(1);

        let payload = TokenPayload {
            provider: "mock".to_string(),
            reference: "ref".to_string(),
            ..Default::default()
        };

        assert!(provider.download(&payload).await.is_err());
        let file = provider.download(&payload).await.unwrap();
        assert_eq!(file.name, "file.srt");
        assert_eq!(provider.download_count(), 2);
    }
}
