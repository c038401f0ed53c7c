//! Disposable page-loading sessions for search result pages.
//!
//! A [`Browser`] opens a [`RenderSession`]; the caller navigates with it and
//! must hand it back through [`RenderSession::close`] on every exit path.
//! Two backends exist:
//!
//! - [`HttpBrowser`]: a plain HTTP GET with browser-like headers and a
//!   rotated desktop user agent, fresh per session (no cookies carried
//!   between sessions). It runs no JavaScript, so it only sees the HTML the
//!   server sends.
//! - [`BrowserlessBrowser`]: a remote headless Chrome reached through the
//!   Browserless `/content` endpoint, which returns the DOM after scripts
//!   ran. Pages that build their results client-side need this backend.
//!
//! Every navigation is bounded by a timeout; a timeout is an ordinary
//! [`RenderError`].

use crate::error::RenderError;
use rand::{rng, Rng};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Opens rendering sessions.
pub trait Browser {
    type Session: RenderSession;

    async fn open(&self) -> Result<Self::Session, RenderError>;
}

/// One exclusive rendering context.
pub trait RenderSession {
    /// Load `url` and return the resulting document HTML.
    async fn navigate(&mut self, url: &str) -> Result<String, RenderError>;

    /// Release the context.
    async fn close(self);
}

fn pick_user_agent(user_agents: &[String]) -> String {
    if user_agents.is_empty() {
        return crate::scrapers::DESKTOP_USER_AGENT.to_string();
    }
    let idx = rng().random_range(0..user_agents.len());
    user_agents[idx].clone()
}

async fn bounded<T>(
    url: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T, RenderError>>,
) -> Result<T, RenderError> {
    timeout(limit, fut).await.map_err(|_| RenderError::Timeout {
        url: url.to_string(),
    })?
}

fn navigation_error(url: &str, err: reqwest::Error) -> RenderError {
    if err.is_timeout() {
        RenderError::Timeout {
            url: url.to_string(),
        }
    } else {
        RenderError::Navigation {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

// --- HTTP emulation ---

/// Default backend: static HTML over HTTP, no script execution.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    user_agents: Vec<String>,
    navigation_timeout: Duration,
}

impl HttpBrowser {
    /// # Arguments
    ///
    /// * `user_agents` - Desktop user agents; each session picks one at random
    /// * `navigation_timeout` - Upper bound for a single navigation
    pub fn new(user_agents: Vec<String>, navigation_timeout: Duration) -> Self {
        Self {
            user_agents,
            navigation_timeout,
        }
    }
}

/// One [`HttpBrowser`] session with its own client and user agent.
#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    navigation_timeout: Duration,
}

impl Browser for HttpBrowser {
    type Session = HttpSession;

    async fn open(&self) -> Result<HttpSession, RenderError> {
        let user_agent = pick_user_agent(&self.user_agents);
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent.as_str())
            .default_headers(headers)
            .timeout(self.navigation_timeout)
            .build()
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        debug!(%user_agent, "Opened HTTP rendering session");
        Ok(HttpSession {
            client,
            navigation_timeout: self.navigation_timeout,
        })
    }
}

impl RenderSession for HttpSession {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn navigate(&mut self, url: &str) -> Result<String, RenderError> {
        let request = async {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| navigation_error(url, e))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: format!("HTTP {}", status.as_u16()),
                });
            }
            resp.text().await.map_err(|e| navigation_error(url, e))
        };
        bounded(url, self.navigation_timeout, request).await
    }

    async fn close(self) {
        debug!("Closed HTTP rendering session");
    }
}

// --- Browserless ---

/// Remote headless browser behind a Browserless deployment.
#[derive(Debug, Clone)]
pub struct BrowserlessBrowser {
    client: reqwest::Client,
    endpoint: String,
    navigation_timeout: Duration,
}

impl BrowserlessBrowser {
    /// Build a client for a Browserless instance.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Instance root, without the `/content` path
    /// * `token` - Sent as the `token` query parameter when present
    /// * `navigation_timeout` - Passed to Browserless and enforced locally
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        navigation_timeout: Duration,
    ) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(navigation_timeout + Duration::from_secs(5))
            .build()
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let mut endpoint = format!("{}/content", base_url.trim_end_matches('/'));
        if let Some(token) = token {
            endpoint.push_str(&format!("?token={}", urlencoding::encode(token)));
        }

        Ok(Self {
            client,
            endpoint,
            navigation_timeout,
        })
    }
}

/// One [`BrowserlessBrowser`] session. Every navigation is a separate
/// `/content` call.
#[derive(Debug)]
pub struct BrowserlessSession {
    client: reqwest::Client,
    endpoint: String,
    navigation_timeout: Duration,
}

impl Browser for BrowserlessBrowser {
    type Session = BrowserlessSession;

    async fn open(&self) -> Result<BrowserlessSession, RenderError> {
        Ok(BrowserlessSession {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            navigation_timeout: self.navigation_timeout,
        })
    }
}

impl RenderSession for BrowserlessSession {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn navigate(&mut self, url: &str) -> Result<String, RenderError> {
        let body = serde_json::json!({
            "url": url,
            "gotoOptions": {
                "waitUntil": "domcontentloaded",
                "timeout": self.navigation_timeout.as_millis() as u64,
            },
        });

        let request = async {
            let resp = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| navigation_error(url, e))?;
            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: format!("browserless returned {}: {}", status.as_u16(), message),
                });
            }
            resp.text().await.map_err(|e| navigation_error(url, e))
        };
        bounded(url, self.navigation_timeout, request).await
    }

    async fn close(self) {
        debug!("Closed browserless session");
    }
}

// --- runtime selection ---

/// Backend chosen at startup.
#[derive(Debug, Clone)]
pub enum AnyBrowser {
    Http(HttpBrowser),
    Browserless(BrowserlessBrowser),
}

#[derive(Debug)]
pub enum AnySession {
    Http(HttpSession),
    Browserless(BrowserlessSession),
}

impl Browser for AnyBrowser {
    type Session = AnySession;

    async fn open(&self) -> Result<AnySession, RenderError> {
        match self {
            AnyBrowser::Http(b) => b.open().await.map(AnySession::Http),
            AnyBrowser::Browserless(b) => b.open().await.map(AnySession::Browserless),
        }
    }
}

impl RenderSession for AnySession {
    async fn navigate(&mut self, url: &str) -> Result<String, RenderError> {
        match self {
            AnySession::Http(s) => s.navigate(url).await,
            AnySession::Browserless(s) => s.navigate(url).await,
        }
    }

    async fn close(self) {
        match self {
            AnySession::Http(s) => s.close().await,
            AnySession::Browserless(s) => s.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_user_agent_rotates_within_list() {
        let agents = vec!["a".to_string(), "b".to_string()];
        for _ in 0..20 {
            let ua = pick_user_agent(&agents);
            assert!(ua == "a" || ua == "b");
        }
        assert!(pick_user_agent(&[]).starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_browserless_endpoint_carries_token() {
        let browser =
            BrowserlessBrowser::new("http://localhost:3000/", Some("s3cr3t"), Duration::from_secs(30))
                .unwrap();
        assert_eq!(browser.endpoint, "http://localhost:3000/content?token=s3cr3t");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_turns_slow_navigation_into_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, RenderError>(String::new())
        };
        let err = bounded("https://slow.test", Duration::from_secs(30), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Timeout { .. }));
    }
}
