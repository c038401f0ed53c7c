//! Generative model interaction with rate-limit aware retries.
//!
//! # Architecture
//!
//! - [`Generate`]: core trait, one prompt in, one text response out
//! - [`GeminiClient`]: REST adapter for the Gemini `generateContent` endpoint;
//!   classifies every failure into a [`BackendErrorKind`]
//! - [`RetryingBackend`]: decorator that retries according to [`retry_delay`]
//!
//! # Retry Strategy
//!
//! Only rate-limit failures are retried. With the default policy a request is
//! attempted at most 3 times, waiting 60s before the second attempt and 120s
//! before the third. Transient, fatal and configuration failures surface
//! immediately.

use crate::error::{BackendError, BackendErrorKind};
use crate::utils::truncate_for_log;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Trait for a text-in, text-out generative backend.
pub trait Generate {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Delay before the next attempt, or `None` when the failure is terminal.
///
/// `attempt` is the 1-based number of the attempt that just failed. Only
/// [`BackendErrorKind::RateLimited`] is retried, with a delay of
/// `base * attempt`.
pub fn retry_delay(
    kind: BackendErrorKind,
    attempt: u32,
    max_attempts: u32,
    base: Duration,
) -> Option<Duration> {
    match kind {
        BackendErrorKind::RateLimited if attempt < max_attempts => Some(base.saturating_mul(attempt)),
        _ => None,
    }
}

/// Decorator adding the rate-limit retry policy to any [`Generate`] backend.
pub struct RetryingBackend<T> {
    inner: T,
    max_attempts: u32,
    base_delay: Duration,
}

impl<T: Generate> RetryingBackend<T> {
    pub fn new(inner: T, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }
}

impl<T> fmt::Debug for RetryingBackend<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingBackend")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl<T: Generate> Generate for RetryingBackend<T> {
    #[instrument(level = "info", skip_all)]
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            match self.inner.generate(prompt).await {
                Ok(text) => {
                    info!(
                        attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        "generate() succeeded"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    let kind = e.kind();
                    let elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64;
                    let Some(delay) = retry_delay(kind, attempt, self.max_attempts, self.base_delay)
                    else {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            ?kind,
                            elapsed_ms_attempt,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "generate() failed; not retrying"
                        );
                        return Err(e);
                    };

                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt,
                        ?delay,
                        error = %e,
                        "Rate limited; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Gemini REST adapter.
///
/// Built once at startup and passed to the rewrite orchestrator; a missing
/// API key fails construction with [`BackendError::Config`].
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: &str, timeout: Duration) -> Result<Self, BackendError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BackendError::Config("GEMINI_API_KEY is not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Config(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(&self.api_key)
        )
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Join the text parts of the first candidate.
fn response_text(body: &str) -> Result<String, BackendError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Fatal(format!("malformed response: {e}")))?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(BackendError::Fatal("response contained no text".into()));
    }
    Ok(text)
}

/// Map an HTTP failure status and body onto a typed backend error.
pub fn classify_status(status: u16, body: &str) -> BackendError {
    let message = format!("HTTP {status}: {}", truncate_for_log(body.trim(), 300));
    let lower = body.to_ascii_lowercase();
    if status == 429 || lower.contains("quota") || body.contains("RESOURCE_EXHAUSTED") {
        BackendError::RateLimited(message)
    } else if status >= 500 || status == 408 {
        BackendError::Transient(message)
    } else {
        BackendError::Fatal(message)
    }
}

fn classify_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() || err.is_connect() {
        BackendError::Transient(err.to_string())
    } else {
        BackendError::Fatal(err.to_string())
    }
}

impl Generate for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let t0 = Instant::now();
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify_transport)?;
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        if !status.is_success() {
            let err = classify_status(status.as_u16(), &text);
            warn!(elapsed_ms, error = %err, "Gemini call failed");
            return Err(err);
        }

        let output = response_text(&text)?;
        info!(
            elapsed_ms,
            chars = output.chars().count(),
            preview = %truncate_for_log(&output, 200),
            "Gemini call succeeded"
        );
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Plays back scripted outcomes and counts calls.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedBackend {
        pub outcomes: Mutex<VecDeque<Result<String, BackendError>>>,
        pub calls: AtomicU32,
    }

    impl ScriptedBackend {
        pub fn new(outcomes: Vec<Result<String, BackendError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            }
        }

        pub fn always_rate_limited() -> Self {
            Self::new(Vec::new())
        }
    }

    impl Generate for ScriptedBackend {
        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::RateLimited("429 quota exceeded".into())))
        }
    }

    impl Generate for &ScriptedBackend {
        async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
            (**self).generate(prompt).await
        }
    }

    #[test]
    fn test_retry_delay_is_linear_and_bounded() {
        let base = Duration::from_secs(60);
        let rl = BackendErrorKind::RateLimited;
        assert_eq!(retry_delay(rl, 1, 3, base), Some(Duration::from_secs(60)));
        assert_eq!(retry_delay(rl, 2, 3, base), Some(Duration::from_secs(120)));
        assert_eq!(retry_delay(rl, 3, 3, base), None);
    }

    #[test]
    fn test_retry_delay_never_retries_other_kinds() {
        let base = Duration::from_secs(60);
        for kind in [
            BackendErrorKind::Transient,
            BackendErrorKind::Fatal,
            BackendErrorKind::Config,
        ] {
            assert_eq!(retry_delay(kind, 1, 3, base), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limit_makes_three_attempts() {
        let backend = ScriptedBackend::always_rate_limited();
        let retrying = RetryingBackend::new(&backend, 3, Duration::from_secs(60));

        let t0 = tokio::time::Instant::now();
        let err = retrying.generate("prompt").await.unwrap_err();

        assert_eq!(err.kind(), BackendErrorKind::RateLimited);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert!(t0.elapsed() >= Duration::from_secs(180));
        assert!(t0.elapsed() < Duration::from_secs(181));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_one_rate_limit() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::RateLimited("429".into())),
            Ok("<p>rewritten</p>".into()),
        ]);
        let retrying = RetryingBackend::new(&backend, 3, Duration::from_secs(60));

        assert_eq!(retrying.generate("prompt").await.unwrap(), "<p>rewritten</p>");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::Fatal("400".into()))]);
        let retrying = RetryingBackend::new(&backend, 3, Duration::from_secs(60));

        let t0 = tokio::time::Instant::now();
        assert!(retrying.generate("prompt").await.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let err = GeminiClient::new(None, "gemini-2.5-flash", Duration::from_secs(60)).unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::Config);
        let err = GeminiClient::new(Some("  ".into()), "gemini-2.5-flash", Duration::from_secs(60))
            .unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::Config);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(429, "").kind(), BackendErrorKind::RateLimited);
        assert_eq!(
            classify_status(403, r#"{"error":{"message":"Quota exceeded for metric"}}"#).kind(),
            BackendErrorKind::RateLimited
        );
        assert_eq!(
            classify_status(400, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#).kind(),
            BackendErrorKind::RateLimited
        );
        assert_eq!(classify_status(503, "overloaded").kind(), BackendErrorKind::Transient);
        assert_eq!(classify_status(400, "bad request").kind(), BackendErrorKind::Fatal);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"<h2>A</h2>"},{"text":"<p>B</p>"}]}}]}"#;
        assert_eq!(response_text(body).unwrap(), "<h2>A</h2><p>B</p>");
        assert_eq!(
            response_text(r#"{"candidates":[]}"#).unwrap_err().kind(),
            BackendErrorKind::Fatal
        );
    }

    #[test]
    fn test_endpoint_includes_model() {
        let client = GeminiClient::new(Some("k".into()), "gemini-2.5-flash", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=k"
        );
    }
}
