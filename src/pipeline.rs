//! Pipeline controller.
//!
//! A job takes one original article through search → scrape references →
//! rewrite → publish. Jobs run strictly one after another in eligibility
//! order, with a fixed pause between them.
//!
//! - Batch mode isolates every job: a failure is recorded in the
//!   [`RunSummary`] and the next job starts regardless.
//! - Single mode runs one job for the newest eligible original and treats a
//!   missing search result or reference as fatal.
//!
//! Eligibility is recomputed from a fresh article list before every job, so
//! an original that gained an enhanced version mid-run is skipped instead of
//! being published twice.

use crate::api::Generate;
use crate::error::{JobError, PipelineError, StoreError};
use crate::models::{
    Article, Citation, JobOutcome, JobRecord, JobState, NewArticle, OriginalText, PipelineJob,
    RewriteRequest, RunSummary,
};
use crate::outputs::citations::render_citations;
use crate::publish::ArticleStore;
use crate::rewrite::Rewriter;
use crate::scrapers::{ContentExtractor, Fetch};
use crate::search::Search;
use crate::utils::slugify_title;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Originals that no article points back to, in list order.
pub fn eligible_originals(articles: &[Article]) -> Vec<Article> {
    let enhanced: HashSet<i64> = articles
        .iter()
        .filter_map(|a| a.original_article_id)
        .collect();
    articles
        .iter()
        .filter(|a| a.is_original() && !enhanced.contains(&a.id))
        .cloned()
        .collect()
}

fn is_eligible(id: i64, articles: &[Article]) -> bool {
    articles.iter().any(|a| a.id == id && a.is_original())
        && !articles.iter().any(|a| a.original_article_id == Some(id))
}

/// The record published for an enhanced version of `source`.
pub fn enhanced_record(
    source: &Article,
    content: String,
    citations: Vec<Citation>,
    unix_millis: i64,
) -> NewArticle {
    let base_slug = if source.slug.is_empty() {
        slugify_title(&source.title)
    } else {
        source.slug.clone()
    };
    NewArticle {
        title: format!("{} (Enhanced)", source.title),
        slug: Some(format!("{base_slug}-enhanced-{unix_millis}")),
        content,
        excerpt: source.excerpt.clone(),
        author: source.author.clone(),
        published_date: None,
        image_url: source.image_url.clone(),
        source_url: source.source_url.clone(),
        is_updated: true,
        original_article_id: Some(source.id),
        references: Some(citations),
    }
}

/// Run parameters shared by batch and single mode.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Search results requested per job.
    pub results: usize,
    /// Pause between consecutive jobs.
    pub pace: Duration,
    /// Scraped references must be longer than this many characters.
    pub min_reference_chars: usize,
}

/// Whether missing references end the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferencePolicy {
    /// Fall back to the knowledge-only rewrite.
    Lenient,
    /// No search result or no usable reference is an error.
    Strict,
}

/// The pipeline controller.
///
/// Every collaborator is injected, so the same controller runs against the
/// HTTP store, web search and Gemini in production and against in-memory
/// doubles in tests.
///
/// # Type Parameters
///
/// * `S` - Article store
/// * `Q` - Reference search
/// * `F` - Page fetcher used for references
/// * `G` - Generative backend behind the [`Rewriter`]
pub struct Pipeline<S, Q, F, G> {
    store: S,
    search: Q,
    scraper: ContentExtractor<F>,
    rewriter: Rewriter<G>,
    options: PipelineOptions,
}

impl<S, Q, F, G> Pipeline<S, Q, F, G>
where
    S: ArticleStore,
    Q: Search,
    F: Fetch,
    G: Generate,
{
    /// Assemble a controller from already-built collaborators.
    ///
    /// # Arguments
    ///
    /// * `store` - Source of originals and target of enhanced records
    /// * `search` - Reference search for article titles
    /// * `scraper` - Reference page fetcher, using the reference profile
    /// * `rewriter` - Prompt builder and backend handle
    /// * `options` - Result count, pacing and reference length floor
    pub fn new(
        store: S,
        search: Q,
        scraper: ContentExtractor<F>,
        rewriter: Rewriter<G>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            search,
            scraper,
            rewriter,
            options,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enhance every eligible original.
    ///
    /// Only failing to load the initial article list is an error; everything
    /// after that lands in the summary.
    #[instrument(level = "info", skip_all)]
    pub async fn run_batch(&self) -> Result<RunSummary, PipelineError> {
        let articles = self.store.list_articles().await?;
        let candidates = eligible_originals(&articles);
        info!(
            total = articles.len(),
            originals = articles.iter().filter(|a| a.is_original()).count(),
            eligible = candidates.len(),
            "Computed articles needing enhancement"
        );

        let mut summary = RunSummary::default();
        let total = candidates.len();
        for (i, candidate) in candidates.into_iter().enumerate() {
            if i > 0 {
                info!(pace_secs = self.options.pace.as_secs(), "Pausing before next article");
                sleep(self.options.pace).await;
            }
            info!(index = i + 1, total, title = %candidate.title, "Processing article");

            let record = match self.still_eligible(candidate.id).await {
                Ok(true) => {
                    let (record, _) = self.process(candidate, ReferencePolicy::Lenient).await;
                    record
                }
                Ok(false) => {
                    warn!(id = candidate.id, "Already enhanced since run start; skipping");
                    JobRecord {
                        article_id: candidate.id,
                        title: candidate.title,
                        outcome: JobOutcome::Skipped {
                            reason: "already enhanced".to_string(),
                        },
                    }
                }
                Err(e) => {
                    let err = JobError::Eligibility(e);
                    error!(id = candidate.id, error = %err, "Eligibility re-check failed");
                    JobRecord {
                        article_id: candidate.id,
                        title: candidate.title,
                        outcome: JobOutcome::Failed {
                            reason: err.to_string(),
                        },
                    }
                }
            };
            summary.jobs.push(record);
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            "Batch complete"
        );
        Ok(summary)
    }

    /// Enhance the most recently published eligible original.
    #[instrument(level = "info", skip_all)]
    pub async fn run_single(&self) -> Result<JobRecord, PipelineError> {
        let candidate = self.single_candidate().await?;
        info!(id = candidate.id, title = %candidate.title, "Selected article");

        let title = candidate.title.clone();
        let (record, result) = self.process(candidate, ReferencePolicy::Strict).await;
        match result {
            Ok(()) => Ok(record),
            Err(source) => Err(PipelineError::Job { title, source }),
        }
    }

    async fn single_candidate(&self) -> Result<Article, PipelineError> {
        let articles = self.store.list_articles().await?;
        if let Some(latest) = self.store.latest_original().await? {
            if is_eligible(latest.id, &articles) {
                return Ok(latest);
            }
            debug!(id = latest.id, "Latest original already enhanced; searching the list");
        }
        eligible_originals(&articles)
            .into_iter()
            .next()
            .ok_or(PipelineError::NoCandidate)
    }

    async fn still_eligible(&self, id: i64) -> Result<bool, StoreError> {
        let articles = self.store.list_articles().await?;
        Ok(is_eligible(id, &articles))
    }

    async fn process(
        &self,
        source: Article,
        policy: ReferencePolicy,
    ) -> (JobRecord, Result<(), JobError>) {
        let mut job = PipelineJob::new(source);
        let result = match self.run_job(&mut job, policy).await {
            Ok(new_id) => {
                info!(new_id, "Enhanced article published");
                job.succeed(new_id);
                Ok(())
            }
            Err(e) => {
                error!(state = ?job.state, error = %e, "Job failed");
                job.fail(e.to_string());
                Err(e)
            }
        };

        let outcome = job.outcome.clone().unwrap_or(JobOutcome::Failed {
            reason: "job ended without an outcome".to_string(),
        });
        let record = JobRecord {
            article_id: job.source.id,
            title: job.source.title.clone(),
            outcome,
        };
        (record, result)
    }

    async fn run_job(
        &self,
        job: &mut PipelineJob,
        policy: ReferencePolicy,
    ) -> Result<i64, JobError> {
        let title = job.source.title.clone();

        job.advance(JobState::Searching);
        let results = self.search.search(&title, self.options.results).await;
        info!(count = results.len(), "Search results");
        if results.is_empty() && policy == ReferencePolicy::Strict {
            return Err(JobError::NoSearchResults(title));
        }

        job.advance(JobState::Scraping);
        for result in &results {
            let scraped = self.scraper.scrape(&result.url).await;
            let chars = scraped.content.chars().count();
            if chars > self.options.min_reference_chars {
                debug!(url = %result.url, chars, "Reference kept");
                job.references.push(scraped);
            } else {
                debug!(url = %result.url, chars, "Reference too short; dropped");
            }
        }
        if job.references.is_empty() {
            if policy == ReferencePolicy::Strict {
                return Err(JobError::NoReferences(title));
            }
            info!("No usable references; rewriting from general knowledge");
        }

        job.advance(JobState::Rewriting);
        let request = RewriteRequest {
            original: OriginalText {
                title: title.clone(),
                content: job.source.content.clone(),
            },
            references: job.references.clone(),
        };
        let body = self.rewriter.rewrite(&request).await?;

        job.advance(JobState::Publishing);
        let citations: Vec<Citation> = job.references.iter().map(Citation::from).collect();
        let content = body + &render_citations(&citations);
        let record = enhanced_record(&job.source, content, citations, Utc::now().timestamp_millis());
        let created = self
            .store
            .create_article(&record)
            .await
            .map_err(JobError::Publish)?;
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedBackend;
    use crate::api::RetryingBackend;
    use crate::config::ExtractorSettings;
    use crate::models::tests::article;
    use crate::models::SearchResult;
    use crate::publish::tests::MemoryStore;
    use crate::scrapers::extract::{ExtractProfile, Extractor};
    use crate::scrapers::tests::StaticFetcher;
    use crate::search::tests::StaticSearch;
    use std::sync::atomic::Ordering;

    const REF_A: &str = "https://www.sprinklr.com/blog/livechat-vs-chatbot/";
    const REF_B: &str = "https://www.brevo.com/blog/chatbot-vs-live-chat/";

    fn reference_page(title: &str) -> String {
        let body: String = (0..3)
            .map(|i| format!("<p>{title} reference paragraph {i}, long enough to survive the reference threshold.</p>"))
            .collect();
        format!("<html><body><h1>{title}</h1>{body}</body></html>")
    }

    fn search_hits() -> StaticSearch {
        StaticSearch {
            results: vec![
                SearchResult {
                    url: REF_A.into(),
                    title: "Sprinklr".into(),
                },
                SearchResult {
                    url: REF_B.into(),
                    title: "Brevo".into(),
                },
            ],
        }
    }

    fn fetcher() -> StaticFetcher {
        StaticFetcher::default()
            .with(REF_A, &reference_page("Sprinklr"))
            .with(REF_B, &reference_page("Brevo"))
    }

    fn pipeline<'a>(
        store: MemoryStore,
        search: StaticSearch,
        fetcher: StaticFetcher,
        backend: &'a ScriptedBackend,
    ) -> Pipeline<MemoryStore, StaticSearch, StaticFetcher, RetryingBackend<&'a ScriptedBackend>> {
        let extractor =
            Extractor::new(&ExtractorSettings::default(), ExtractProfile::Reference).unwrap();
        Pipeline::new(
            store,
            search,
            ContentExtractor::new(fetcher, extractor),
            Rewriter::new(
                RetryingBackend::new(backend, 3, Duration::from_secs(60)),
                3000,
            ),
            PipelineOptions {
                results: 2,
                pace: Duration::from_secs(30),
                min_reference_chars: 100,
            },
        )
    }

    #[test]
    fn test_eligibility_excludes_enhanced_originals() {
        let articles = vec![
            article(1, false, None),
            article(2, false, None),
            article(3, true, Some(2)),
        ];
        let ids: Vec<i64> = eligible_originals(&articles).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1]);
        assert!(is_eligible(1, &articles));
        assert!(!is_eligible(2, &articles));
        assert!(!is_eligible(3, &articles));
    }

    #[test]
    fn test_enhanced_record_shape() {
        let mut source = article(5, false, None);
        source.excerpt = Some("Teaser".into());
        let record = enhanced_record(&source, "<p>x</p>".into(), Vec::new(), 1_700_000_000_000);
        assert_eq!(record.title, "Article 5 (Enhanced)");
        assert_eq!(record.slug.as_deref(), Some("article-5-enhanced-1700000000000"));
        assert_eq!(record.excerpt.as_deref(), Some("Teaser"));
        assert_eq!(record.source_url, source.source_url);
        assert!(record.is_updated);
        assert_eq!(record.original_article_id, Some(5));
        assert_eq!(record.references, Some(Vec::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_isolates_failures_and_paces_jobs() {
        let store = MemoryStore::with(vec![article(2, false, None), article(1, false, None)]);
        let backend = ScriptedBackend::new(vec![Ok("<h2>Rewritten</h2><p>Body</p>".into())]);
        let pipeline = pipeline(store, search_hits(), fetcher(), &backend);

        let t0 = tokio::time::Instant::now();
        let summary = pipeline.run_batch().await.unwrap();
        let elapsed = t0.elapsed();

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.jobs[0].article_id, 2);
        assert!(matches!(summary.jobs[0].outcome, JobOutcome::Succeeded { .. }));
        match &summary.jobs[1].outcome {
            JobOutcome::Failed { reason } => assert!(reason.contains("rate limited")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
        // 30s pacing plus 60s and 120s backoff.
        assert!(elapsed >= Duration::from_secs(210));

        let stored = pipeline.store().snapshot();
        let enhanced = stored.iter().find(|a| a.is_updated).unwrap();
        assert_eq!(enhanced.title, "Article 2 (Enhanced)");
        assert_eq!(enhanced.original_article_id, Some(2));
        assert!(enhanced.content.starts_with("<h2>Rewritten</h2><p>Body</p>\n<hr>"));
        assert!(enhanced.content.contains(REF_A));
        assert_eq!(enhanced.references.as_ref().unwrap().as_array().unwrap().len(), 2);
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_without_references_uses_knowledge_only() {
        let store = MemoryStore::with(vec![article(1, false, None)]);
        let backend = ScriptedBackend::new(vec![Ok("<p>Expanded</p>".into())]);
        let pipeline = pipeline(store, search_hits(), StaticFetcher::default(), &backend);

        let summary = pipeline.run_batch().await.unwrap();
        assert_eq!(summary.succeeded(), 1);

        let stored = pipeline.store().snapshot();
        let enhanced = stored.iter().find(|a| a.is_updated).unwrap();
        assert_eq!(enhanced.content, "<p>Expanded</p>");
        assert_eq!(enhanced.references, Some(serde_json::json!([])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_skips_original_enhanced_mid_run() {
        // The same original listed twice must only be published once.
        let store = MemoryStore::with(vec![article(1, false, None), article(1, false, None)]);
        let backend = ScriptedBackend::new(vec![Ok("<p>Once</p>".into()), Ok("<p>Twice</p>".into())]);
        let pipeline = pipeline(store, search_hits(), fetcher(), &backend);

        let summary = pipeline.run_batch().await.unwrap();
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_with_nothing_to_do() {
        let store = MemoryStore::with(vec![article(2, true, Some(1)), article(1, false, None)]);
        let backend = ScriptedBackend::default();
        let pipeline = pipeline(store, search_hits(), fetcher(), &backend);

        let t0 = tokio::time::Instant::now();
        let summary = pipeline.run_batch().await.unwrap();
        assert!(summary.jobs.is_empty());
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_falls_back_to_newest_eligible() {
        let store = MemoryStore::with(vec![
            article(3, true, Some(2)),
            article(2, false, None),
            article(1, false, None),
        ]);
        let backend = ScriptedBackend::new(vec![Ok("<p>Single</p>".into())]);
        let pipeline = pipeline(store, search_hits(), fetcher(), &backend);

        let record = pipeline.run_single().await.unwrap();
        assert_eq!(record.article_id, 1);
        let stored = pipeline.store().snapshot();
        assert_eq!(stored[0].original_article_id, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_without_references_is_fatal() {
        let store = MemoryStore::with(vec![article(1, false, None)]);
        let backend = ScriptedBackend::default();
        let pipeline = pipeline(store, search_hits(), StaticFetcher::default(), &backend);

        let err = pipeline.run_single().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Job {
                source: JobError::NoReferences(_),
                ..
            }
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_without_search_results_is_fatal() {
        let store = MemoryStore::with(vec![article(1, false, None)]);
        let backend = ScriptedBackend::default();
        let pipeline = pipeline(store, StaticSearch::default(), fetcher(), &backend);

        let err = pipeline.run_single().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Job {
                source: JobError::NoSearchResults(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_without_candidate() {
        let store = MemoryStore::with(vec![article(2, true, Some(1)), article(1, false, None)]);
        let backend = ScriptedBackend::default();
        let pipeline = pipeline(store, search_hits(), fetcher(), &backend);

        assert!(matches!(
            pipeline.run_single().await,
            Err(PipelineError::NoCandidate)
        ));
    }
}
