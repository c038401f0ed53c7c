//! Reference discovery through web search.
//!
//! Engines are tried strictly in order. The next engine is only consulted
//! when the current one fails or has nothing left after filtering. When every
//! engine comes up empty the curated fallback table answers, so a search with
//! `limit >= 1` never returns an empty list.
//!
//! # Submodules
//!
//! - [`render`]: rendering contexts (HTTP emulation, Browserless)
//! - [`engine`]: one engine driven by its profile

pub mod engine;
pub mod render;

use crate::config::{FallbackEntry, SearchSettings};
use crate::error::ConfigError;
use crate::models::SearchResult;
use engine::EngineProvider;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use render::Browser;
use tracing::{info, instrument, warn};
use url::Url;

static YEAR_MONTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}/\d{2}").expect("static regex"));

/// Anything that can turn a topic into reference candidates.
pub trait Search {
    async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult>;
}

/// Exclusion, de-duplication and article-likeness rules shared by all engines.
#[derive(Debug, Clone)]
pub struct ResultFilter {
    excluded_domains: Vec<String>,
    article_tokens: Vec<String>,
}

impl ResultFilter {
    pub fn new(settings: &SearchSettings) -> Self {
        Self {
            excluded_domains: lowercase(&settings.excluded_domains),
            article_tokens: lowercase(&settings.article_tokens),
        }
    }

    /// Host equals, or is a subdomain of, a globally or engine-excluded domain.
    pub fn is_excluded(&self, url: &Url, engine_excluded: &[String]) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.to_ascii_lowercase();
        self.excluded_domains
            .iter()
            .chain(engine_excluded.iter())
            .any(|domain| {
                let domain = domain.to_ascii_lowercase();
                host == domain || host.ends_with(&format!(".{domain}"))
            })
    }

    /// The URL path carries an article token or a `YYYY/MM` segment.
    ///
    /// Only the path counts, so `postman.com/pricing` is not an article.
    pub fn is_article_like(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let path = parsed.path().to_lowercase();
        self.article_tokens.iter().any(|t| path.contains(t.as_str()))
            || YEAR_MONTH_RE.is_match(&path)
    }

    /// De-duplicate by URL (first wins), keep article-like URLs, cap at `limit`.
    pub fn finalize(&self, candidates: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
        candidates
            .into_iter()
            .unique_by(|r| r.url.clone())
            .filter(|r| self.is_article_like(&r.url))
            .take(limit)
            .collect()
    }
}

fn lowercase(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// First fallback row whose keyword occurs in the query, else the default row.
pub fn static_fallback(
    table: &[FallbackEntry],
    default: &[SearchResult],
    query: &str,
    limit: usize,
) -> Vec<SearchResult> {
    let query = query.to_lowercase();
    let (keyword, results) = table
        .iter()
        .filter(|entry| !entry.results.is_empty())
        .find(|entry| query.contains(&entry.keyword.to_lowercase()))
        .map(|entry| (entry.keyword.as_str(), entry.results.as_slice()))
        .unwrap_or(("default", default));
    info!(keyword, "Using curated fallback references");
    results.iter().take(limit).cloned().collect()
}

/// The engine chain backed by a rendering context.
#[derive(Debug, Clone)]
pub struct WebSearch<B> {
    browser: B,
    engines: Vec<EngineProvider>,
    filter: ResultFilter,
    fallback: Vec<FallbackEntry>,
    default_fallback: Vec<SearchResult>,
}

impl<B: Browser> WebSearch<B> {
    /// Build one provider per configured engine, in configured order.
    pub fn new(browser: B, settings: &SearchSettings) -> Result<Self, ConfigError> {
        let engines = settings
            .engines
            .iter()
            .cloned()
            .map(EngineProvider::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            browser,
            engines,
            filter: ResultFilter::new(settings),
            fallback: settings.fallback.clone(),
            default_fallback: settings.default_fallback.clone(),
        })
    }
}

impl<B: Browser> Search for WebSearch<B> {
    #[instrument(level = "info", skip_all, fields(%query, limit))]
    async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        if limit == 0 {
            return Vec::new();
        }
        for engine in &self.engines {
            match engine.search(&self.browser, &self.filter, query, limit).await {
                Ok(results) if !results.is_empty() => return results,
                Ok(_) => info!(engine = engine.name(), "No usable results; trying next engine"),
                Err(e) => warn!(engine = engine.name(), error = %e, "Search engine failed; trying next engine"),
            }
        }
        warn!("All search engines came up empty");
        static_fallback(&self.fallback, &self.default_fallback, query, limit)
    }
}
