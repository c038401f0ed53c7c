//! One search engine, driven entirely by its [`EngineProfile`].

use crate::config::EngineProfile;
use crate::error::{ConfigError, RenderError};
use crate::models::SearchResult;
use crate::scrapers::selectors::{element_text, SelectorChain};
use crate::search::render::{Browser, RenderSession};
use crate::search::ResultFilter;
use crate::utils::squash_whitespace;
use rand::{rng, Rng};
use scraper::{ElementRef, Html};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};
use url::Url;

/// A search engine whose URL template, selectors, exclusions and settle
/// delay all come from its profile.
#[derive(Debug, Clone)]
pub struct EngineProvider {
    profile: EngineProfile,
    containers: SelectorChain,
    link: Option<SelectorChain>,
    title: SelectorChain,
    generic_scan: SelectorChain,
}

impl EngineProvider {
    /// Compile a profile's selectors.
    ///
    /// # Returns
    ///
    /// A [`ConfigError`] naming `search.engines.<name>` for an invalid selector.
    pub fn new(profile: EngineProfile) -> Result<Self, ConfigError> {
        let field = format!("search.engines.{}", profile.name);
        let link = profile
            .link
            .as_ref()
            .map(|link| SelectorChain::parse(&field, std::slice::from_ref(link)))
            .transpose()?;
        Ok(Self {
            containers: SelectorChain::parse(&field, &profile.containers)?,
            link,
            title: SelectorChain::parse(&field, &profile.title)?,
            generic_scan: SelectorChain::parse(&field, std::slice::from_ref(&profile.generic_scan))?,
            profile,
        })
    }

    /// Profile name, as used in logs.
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Query this engine and return up to `limit` filtered results.
    ///
    /// The rendering session is closed before the result is inspected, so it
    /// is released whether navigation succeeded, failed or found nothing.
    #[instrument(level = "info", skip_all, fields(engine = %self.profile.name, %query))]
    pub async fn search<B: Browser>(
        &self,
        browser: &B,
        filter: &ResultFilter,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, RenderError> {
        let search_url = self.profile.search_url(query);
        let mut session = browser.open().await?;
        let page = self.load(&mut session, &search_url).await;
        session.close().await;
        let html = page?;

        let base = Url::parse(&search_url).map_err(|e| RenderError::Navigation {
            url: search_url.clone(),
            message: e.to_string(),
        })?;
        let candidates = self.candidates(&html, &base, filter);
        let results = filter.finalize(candidates, limit);
        info!(count = results.len(), "Engine returned results");
        Ok(results)
    }

    async fn load<S: RenderSession>(&self, session: &mut S, url: &str) -> Result<String, RenderError> {
        let html = session.navigate(url).await?;
        sleep(self.settle_delay()).await;
        Ok(html)
    }

    fn settle_delay(&self) -> Duration {
        let (lo, hi) = self.profile.settle_range();
        if hi > lo {
            let ms = rng().random_range(lo.as_millis() as u64..=hi.as_millis() as u64);
            Duration::from_millis(ms)
        } else {
            lo
        }
    }

    /// Result links from the page, with engine and global exclusions applied.
    ///
    /// The generic link scan only runs when the result containers give nothing.
    pub fn candidates(&self, html: &str, base: &Url, filter: &ResultFilter) -> Vec<SearchResult> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let keep = |result: &SearchResult| {
            Url::parse(&result.url)
                .map(|url| !filter.is_excluded(&url, &self.profile.excluded_domains))
                .unwrap_or(false)
        };

        let primary: Vec<SearchResult> = self
            .containers
            .alternatives()
            .flat_map(|selector| root.select(selector))
            .filter_map(|container| self.from_container(container, base))
            .filter(|r| keep(r))
            .collect();
        if !primary.is_empty() {
            return primary;
        }

        debug!("Result containers empty; scanning all links");
        self.generic_scan
            .select_all(root)
            .into_iter()
            .filter_map(|anchor| {
                let url = resolve_link(anchor.value().attr("href")?, base)?;
                let title = anchor_title(anchor).unwrap_or_else(|| url.clone());
                Some(SearchResult { url, title })
            })
            .filter(|r| keep(r))
            .collect()
    }

    fn from_container(&self, container: ElementRef<'_>, base: &Url) -> Option<SearchResult> {
        let anchor = match &self.link {
            Some(link) => link.first(container)?,
            None => container,
        };
        let url = resolve_link(anchor.value().attr("href")?, base)?;
        let title = self
            .title
            .first_map(container, anchor_title)
            .or_else(|| anchor_title(anchor))
            .unwrap_or_else(|| url.clone());
        Some(SearchResult { url, title })
    }
}

fn anchor_title(el: ElementRef<'_>) -> Option<String> {
    let text = squash_whitespace(&element_text(el));
    (!text.is_empty()).then_some(text)
}

/// Absolute http(s) URL for an anchor, with engine redirect wrappers removed.
pub fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let url = base.join(href.trim()).ok()?;
    let url = unwrap_redirect(url);
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// `/url?q=<target>` and DuckDuckGo's `/l/?uddg=<target>` point at `target`.
pub fn unwrap_redirect(url: Url) -> Url {
    let key = match url.path() {
        "/url" => "q",
        "/l/" | "/l" => "uddg",
        _ => return url,
    };
    let target = url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| Url::parse(&v).ok());
    target.unwrap_or(url)
}
