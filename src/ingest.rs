//! Ingestion of original articles from the blog index.
//!
//! One page of the paginated index is parsed into summaries. Each summary
//! whose URL already exists as some record's `source_url` is skipped; the
//! rest are fetched, extracted and stored as originals.

use crate::config::IngestSettings;
use crate::error::PipelineError;
use crate::models::{ArticleSummary, NewArticle};
use crate::publish::ArticleStore;
use crate::scrapers::extract::Extractor;
use crate::scrapers::listing::ListParser;
use crate::scrapers::{ContentExtractor, Fetch};
use crate::utils::{parse_date_text, slugify_title};
use std::fmt;
use tracing::{error, info, instrument, warn};
use url::Url;

/// What happened to each summary on the page.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub created: Vec<(i64, String)>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Created: {}", self.created.len())?;
        writeln!(f, "Skipped (already exists): {}", self.skipped.len())?;
        writeln!(f, "Failed: {}", self.failed.len())?;
        for (title, reason) in &self.failed {
            writeln!(f, "  - \"{title}\": {reason}")?;
        }
        Ok(())
    }
}

/// Stores original articles from the blog index, skipping sources already
/// present.
pub struct Ingestor<'a, S, F> {
    store: &'a S,
    fetcher: &'a F,
    parser: ListParser,
    extractor: Extractor,
    settings: IngestSettings,
}

impl<'a, S, F> Ingestor<'a, S, F>
where
    S: ArticleStore,
    F: Fetch + Clone,
{
    /// # Arguments
    ///
    /// * `store` - Where originals are looked up and created
    /// * `fetcher` - Used for the index page and every article page
    /// * `parser` - Turns the index page into summaries
    /// * `extractor` - Should use [`ExtractProfile::Source`](crate::scrapers::extract::ExtractProfile::Source)
    /// * `settings` - Index URL template
    pub fn new(
        store: &'a S,
        fetcher: &'a F,
        parser: ListParser,
        extractor: Extractor,
        settings: IngestSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            parser,
            extractor,
            settings,
        }
    }

    /// Ingest up to `count` articles from index page `page`.
    ///
    /// An unreachable or empty index page is an error; per-article problems
    /// are recorded in the summary.
    #[instrument(level = "info", skip(self))]
    pub async fn run(&self, page: u32, count: usize) -> Result<IngestSummary, PipelineError> {
        let index_url = self.settings.index_url(page);
        let base = Url::parse(&index_url)
            .map_err(|e| PipelineError::EmptyIndex(format!("{index_url} ({e})")))?;

        let html = self.fetcher.fetch(&index_url).await?;
        let summaries = self.parser.parse(&html, &base);
        if summaries.is_empty() {
            return Err(PipelineError::EmptyIndex(index_url));
        }

        let selected: Vec<ArticleSummary> = summaries.into_iter().take(count).collect();
        info!(count = selected.len(), "Articles selected for ingestion");

        let content = ContentExtractor::new(self.fetcher.clone(), self.extractor.clone());
        let mut summary = IngestSummary::default();
        for item in selected {
            match self.store.find_by_source_url(&item.url).await {
                Ok(Some(existing)) => {
                    info!(title = %item.title, existing_id = existing.id, "Skipping: source already stored");
                    summary.skipped.push(item.title);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(title = %item.title, error = %e, "Duplicate check failed");
                    summary.failed.push((item.title, e.to_string()));
                    continue;
                }
            }

            let extracted = match content.try_scrape(&item.url).await {
                Ok(extracted) => extracted,
                Err(e) => {
                    warn!(title = %item.title, error = %e, "Article page could not be fetched");
                    summary.failed.push((item.title, e.to_string()));
                    continue;
                }
            };

            let record = new_original(&item, extracted.content);
            match self.store.create_article(&record).await {
                Ok(created) => {
                    info!(id = created.id, title = %created.title, "Stored original article");
                    summary.created.push((created.id, created.title));
                }
                Err(e) => {
                    error!(title = %item.title, error = %e, "Failed to store article");
                    summary.failed.push((item.title, e.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

fn new_original(item: &ArticleSummary, content: String) -> NewArticle {
    NewArticle {
        title: item.title.clone(),
        slug: Some(slugify_title(&item.title)),
        content,
        excerpt: item.excerpt.clone(),
        author: item.author.clone(),
        published_date: item.date_text.as_deref().and_then(parse_date_text),
        image_url: item.image_url.clone(),
        source_url: item.url.clone(),
        is_updated: false,
        original_article_id: None,
        references: None,
    }
}
