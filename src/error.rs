//! Error taxonomy for the enhancement pipeline.
//!
//! Each component owns an error type. Most of them never escape their
//! component: fetch failures become sentinel content, engine failures become
//! empty result lists and provider exhaustion becomes static fallback data.
//! Only [`BackendError`], [`StoreError`] and [`ConfigError`] travel upward, and
//! the pipeline controller catches them at the job boundary as [`JobError`].

use thiserror::Error;

/// Failure to fetch a page over plain HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Failure inside a rendering context (session launch or navigation).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to open rendering context: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("navigation to {url} timed out")]
    Timeout { url: String },
}

/// How a generative backend failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    RateLimited,
    Transient,
    Fatal,
    Config,
}

/// Typed failure returned by a generative backend adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("backend rejected request: {0}")]
    Fatal(String),

    #[error("backend not configured: {0}")]
    Config(String),
}

impl BackendError {
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::RateLimited(_) => BackendErrorKind::RateLimited,
            BackendError::Transient(_) => BackendErrorKind::Transient,
            BackendError::Fatal(_) => BackendErrorKind::Fatal,
            BackendError::Config(_) => BackendErrorKind::Config,
        }
    }
}

/// Failure talking to the article persistence API.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("article API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("article API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failure loading or validating the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid selector `{selector}` in {field}")]
    Selector { field: String, selector: String },

    #[error("missing configuration: {0}")]
    Missing(String),
}

/// Failure of one article job. Recorded in the run summary, never propagated
/// to sibling jobs.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("rewrite failed: {0}")]
    Rewrite(#[from] BackendError),

    #[error("publish failed: {0}")]
    Publish(#[source] StoreError),

    #[error("eligibility check failed: {0}")]
    Eligibility(#[source] StoreError),

    #[error("search returned no results for \"{0}\"")]
    NoSearchResults(String),

    #[error("no reference article could be scraped for \"{0}\"")]
    NoReferences(String),
}

/// Run-level failure. Mapped to exit code 1 by `main`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(BackendError),

    #[error("could not load articles: {0}")]
    Store(#[from] StoreError),

    #[error("no original article is waiting for enhancement")]
    NoCandidate,

    #[error("failed to fetch index page: {0}")]
    Index(#[from] FetchError),

    #[error("no articles found on index page {0}")]
    EmptyIndex(String),

    #[error("\"{title}\": {source}")]
    Job {
        title: String,
        #[source]
        source: JobError,
    },
}

impl From<BackendError> for PipelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Config(msg) => PipelineError::Config(ConfigError::Missing(msg)),
            other => PipelineError::Backend(other),
        }
    }
}
