//! Data models for scraped pages, search results, rewrite requests, API
//! records and pipeline jobs.
//!
//! - [`ArticleSummary`]: one entry of a paginated blog index page
//! - [`ExtractedArticle`]: normalized article text pulled from a page
//! - [`SearchResult`]: a candidate reference URL returned by a search engine
//! - [`RewriteRequest`]: input to the rewrite orchestrator
//! - [`Article`], [`NewArticle`]: persistence API records
//! - [`PipelineJob`], [`JobState`], [`RunSummary`]: controller bookkeeping

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// One article teaser found on a blog index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub title: String,
    /// Absolute URL of the article page.
    pub url: String,
    pub image_url: Option<String>,
    /// At most 300 characters.
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub date_text: Option<String>,
}

/// Article content pulled out of a single page.
///
/// `content` is never empty: when nothing usable is found it holds one of the
/// extractor's sentinel strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub content: String,
    pub url: String,
}

/// A third-party page scraped to ground a rewrite.
pub type ReferenceArticle = ExtractedArticle;

/// A search hit usable as an enhancement reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
}

/// The original article as seen by the rewrite prompt.
#[derive(Debug, Clone)]
pub struct OriginalText {
    pub title: String,
    pub content: String,
}

/// Input to the rewrite orchestrator. An empty `references` list selects the
/// knowledge-only mode.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub original: OriginalText,
    pub references: Vec<ReferenceArticle>,
}

/// Title/URL pair stored alongside an enhanced article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

impl From<&ReferenceArticle> for Citation {
    fn from(reference: &ReferenceArticle) -> Self {
        Citation {
            title: reference.title.clone(),
            url: reference.url.clone(),
        }
    }
}

/// An article record as returned by the persistence API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub content: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub is_updated: bool,
    pub original_article_id: Option<i64>,
    #[serde(default)]
    pub references: Option<serde_json::Value>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Article {
    /// An original is a scraped source record, not an enhanced rewrite.
    pub fn is_original(&self) -> bool {
        !self.is_updated
    }
}

/// Body of `POST /articles`. `slug` is derived server-side when omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewArticle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub source_url: String,
    pub is_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_article_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<Citation>>,
}

/// API responses wrap the payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Job lifecycle. Transitions only move forward; `Failed` can be entered from
/// any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum JobState {
    Pending,
    Searching,
    Scraping,
    Rewriting,
    Publishing,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Outcome of one job as reported in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { new_article_id: i64 },
    Failed { reason: String },
    Skipped { reason: String },
}

/// One original article moving through search → scrape → rewrite → publish.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub source: Article,
    pub state: JobState,
    pub references: Vec<ReferenceArticle>,
    pub outcome: Option<JobOutcome>,
}

impl PipelineJob {
    pub fn new(source: Article) -> Self {
        Self {
            source,
            state: JobState::Pending,
            references: Vec::new(),
            outcome: None,
        }
    }

    /// Move to `next`. Backward moves and moves out of a terminal state are
    /// ignored and return `false`.
    pub fn advance(&mut self, next: JobState) -> bool {
        if self.state.is_terminal() || next <= self.state {
            return false;
        }
        debug!(article_id = self.source.id, from = ?self.state, to = ?next, "Job state change");
        self.state = next;
        true
    }

    pub fn succeed(&mut self, new_article_id: i64) {
        self.advance(JobState::Done);
        self.outcome = Some(JobOutcome::Succeeded { new_article_id });
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.advance(JobState::Failed);
        self.outcome = Some(JobOutcome::Failed {
            reason: reason.into(),
        });
    }
}

/// One line of the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub article_id: i64,
    pub title: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// Result of a whole batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub jobs: Vec<JobRecord>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Succeeded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Skipped { .. }))
            .count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Successful: {}", self.succeeded())?;
        writeln!(f, "Failed: {}", self.failed())?;
        if self.skipped() > 0 {
            writeln!(f, "Skipped: {}", self.skipped())?;
        }
        if self.failed() > 0 {
            writeln!(f, "\nFailed articles:")?;
            for job in &self.jobs {
                if let JobOutcome::Failed { reason } = &job.outcome {
                    writeln!(f, "  - \"{}\": {}", job.title, reason)?;
                }
            }
        }
        Ok(())
    }
}
