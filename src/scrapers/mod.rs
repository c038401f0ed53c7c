//! Page fetching and HTML parsing.
//!
//! # Submodules
//!
//! - [`selectors`]: ordered selector alternatives built from settings
//! - [`listing`]: blog index page → article summaries
//! - [`extract`]: article page → article body, with a fixed fallback order
//!
//! Fetching sits behind the [`Fetch`] trait so the extractor and the
//! ingestion command can be exercised against canned pages.

pub mod extract;
pub mod listing;
pub mod selectors;

use crate::error::FetchError;
use crate::models::ExtractedArticle;
use extract::{fetch_failure, Extractor};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fetch a page body as text.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain HTTP GET with browser-like headers and a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Fetch-then-extract for one article URL.
#[derive(Debug, Clone)]
pub struct ContentExtractor<F> {
    fetcher: F,
    extractor: Extractor,
}

impl<F: Fetch> ContentExtractor<F> {
    pub fn new(fetcher: F, extractor: Extractor) -> Self {
        Self { fetcher, extractor }
    }

    /// Fetch and extract, keeping the fetch failure for callers that must
    /// not store a placeholder.
    pub async fn try_scrape(&self, url: &str) -> Result<ExtractedArticle, FetchError> {
        let html = self.fetcher.fetch(url).await?;
        Ok(self.extractor.extract(&html, url))
    }

    /// Always returns a record; fetch failures become the failure sentinel.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn scrape(&self, url: &str) -> ExtractedArticle {
        match self.try_scrape(url).await {
            Ok(article) => article,
            Err(e) => {
                warn!(error = %e, "Fetch failed; using failure sentinel");
                fetch_failure(url)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ExtractorSettings;
    use extract::{ExtractProfile, FETCH_FAILED};
    use std::collections::HashMap;

    /// Serves canned pages by URL; unknown URLs fail with 404.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct StaticFetcher {
        pub pages: HashMap<String, String>,
    }

    impl StaticFetcher {
        pub fn with(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    impl Fetch for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    fn extractor() -> Extractor {
        Extractor::new(&ExtractorSettings::default(), ExtractProfile::Reference).unwrap()
    }

    #[tokio::test]
    async fn test_scrape_extracts_fetched_page() {
        let fetcher = StaticFetcher::default().with(
            "https://x.test/ok",
            "<html><body><h1>Hello</h1><p>This paragraph is long enough for the reference profile threshold.</p></body></html>",
        );
        let article = ContentExtractor::new(fetcher, extractor())
            .scrape("https://x.test/ok")
            .await;
        assert_eq!(article.title, "Hello");
        assert!(article.content.starts_with("<p>This paragraph"));
    }

    #[tokio::test]
    async fn test_scrape_failure_is_sentinel() {
        let article = ContentExtractor::new(StaticFetcher::default(), extractor())
            .scrape("https://x.test/missing")
            .await;
        assert_eq!(article.content, FETCH_FAILED);
        assert_eq!(article.url, "https://x.test/missing");
    }

    #[tokio::test]
    async fn test_try_scrape_reports_fetch_failure() {
        let scraper = ContentExtractor::new(StaticFetcher::default(), extractor());
        let err = scraper.try_scrape("https://x.test/missing").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_try_scrape_keeps_sentinel_text_from_real_pages() {
        // A page whose body happens to read like the sentinel is still a page.
        let fetcher = StaticFetcher::default().with(
            "https://x.test/odd",
            &format!("<html><body><h1>Odd</h1><p>{FETCH_FAILED}</p></body></html>"),
        );
        let article = ContentExtractor::new(fetcher, extractor())
            .try_scrape("https://x.test/odd")
            .await
            .unwrap();
        assert_eq!(article.title, "Odd");
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(15)).is_ok());
    }
}
