//! Runtime settings loaded from an optional YAML file.
//!
//! Every table has a complete default, so a settings file only needs to name
//! what it overrides. Selector strings are validated once at startup through
//! [`Settings::validate`]; a malformed selector is a configuration error and
//! the process exits before any network work starts.
//!
//! ```yaml
//! pipeline:
//!   pace_secs: 45
//! search:
//!   excluded_domains: [beyondchats.com, youtube.com, pinterest.com]
//! ```

use crate::error::ConfigError;
use crate::models::SearchResult;
use crate::scrapers::selectors::SelectorChain;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listing: ListingSettings,
    pub extractor: ExtractorSettings,
    pub search: SearchSettings,
    pub rewrite: RewriteSettings,
    pub pipeline: PipelineSettings,
    pub network: NetworkSettings,
    pub ingest: IngestSettings,
}

/// Selector chains for the blog index List Parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    pub items: Vec<String>,
    pub title_link: Vec<String>,
    pub image: Vec<String>,
    pub excerpt: Vec<String>,
    pub author: Vec<String>,
    pub date: Vec<String>,
    pub excerpt_max_chars: usize,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            items: strings(&["article", r#"div[class*="post"]"#, r#"div[class*="blog-item"]"#]),
            title_link: strings(&["h2 a", "h3 a", r#"a[class*="entry-title"]"#]),
            image: strings(&["img"]),
            excerpt: strings(&["p", r#"div[class*="excerpt"]"#]),
            author: strings(&[r#"[class*="author"]"#, r#"a[rel*="author"]"#]),
            date: strings(&[r#"[class*="date"]"#, "time"]),
            excerpt_max_chars: 300,
        }
    }
}

/// Content Extractor heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Elements whose whole subtree is ignored by every extraction path.
    pub strip: Vec<String>,
    /// Content containers probed in order when paragraph aggregation is too short.
    pub content_selectors: Vec<String>,
    pub paragraph_selector: String,
    pub heading_selector: String,
    pub heading_min_chars: usize,
    pub heading_max_chars: usize,
    pub min_total_chars: usize,
    /// Paragraph threshold when extracting the blog's own articles.
    pub source_min_paragraph_chars: usize,
    /// Paragraph threshold when extracting third-party reference pages.
    pub reference_min_paragraph_chars: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            strip: strings(&[
                "script",
                "style",
                "noscript",
                "nav",
                "header",
                "footer",
                "aside",
                "form",
                ".advertisement",
                ".sidebar",
                ".comments",
                ".social-share",
            ]),
            content_selectors: strings(&[
                r#"[class*="has-content-area"]"#,
                r#"[class*="elementor-widget-theme-post-content"]"#,
                r#"article [class*="elementor-widget-container"]"#,
                "article",
                r#"[class*="post-content"]"#,
                r#"[class*="entry-content"]"#,
                r#"[class*="article-content"]"#,
                "main",
                r#"[role="main"]"#,
            ]),
            paragraph_selector: "p".into(),
            heading_selector: "h2, h3".into(),
            heading_min_chars: 5,
            heading_max_chars: 200,
            min_total_chars: 500,
            source_min_paragraph_chars: 30,
            reference_min_paragraph_chars: 50,
        }
    }
}

/// How one search engine's result page is queried and read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineProfile {
    pub name: String,
    /// Search URL with a `{query}` placeholder for the percent-encoded query.
    pub url_template: String,
    /// Result containers, probed in order. Every match of every selector is read.
    pub containers: Vec<String>,
    /// Link inside a container. `None` means the container is the link itself.
    pub link: Option<String>,
    /// Title inside a container; falls back to the link text.
    pub title: Vec<String>,
    /// Scan used when the containers yield nothing.
    pub generic_scan: String,
    /// Domains this engine links to that are never references.
    pub excluded_domains: Vec<String>,
    pub settle_ms: u64,
    pub settle_jitter_ms: u64,
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            url_template: String::new(),
            containers: Vec::new(),
            link: Some(r#"a[href^="http"]"#.into()),
            title: Vec::new(),
            generic_scan: r#"a[href^="http"]"#.into(),
            excluded_domains: Vec::new(),
            settle_ms: 1500,
            settle_jitter_ms: 0,
        }
    }
}

impl EngineProfile {
    pub fn google() -> Self {
        Self {
            name: "google".into(),
            url_template: "https://www.google.com/search?q={query}&hl=en".into(),
            containers: strings(&[
                "div.g",
                "div[data-sokoban-container]",
                "div.MjjYud",
                "div.N54PNb",
            ]),
            title: strings(&["h3"]),
            excluded_domains: strings(&["google.com"]),
            settle_ms: 2000,
            settle_jitter_ms: 2000,
            ..Self::default()
        }
    }

    pub fn bing() -> Self {
        Self {
            name: "bing".into(),
            url_template: "https://www.bing.com/search?q={query}".into(),
            containers: strings(&["li.b_algo", ".b_algo"]),
            title: strings(&["h2"]),
            excluded_domains: strings(&["bing.com", "microsoft.com"]),
            ..Self::default()
        }
    }

    pub fn duckduckgo() -> Self {
        Self {
            name: "duckduckgo".into(),
            url_template: "https://html.duckduckgo.com/html/?q={query}".into(),
            containers: strings(&[".result__a", ".result a", "a.result__url"]),
            link: None,
            excluded_domains: strings(&["duckduckgo.com"]),
            ..Self::default()
        }
    }

    pub fn search_url(&self, query: &str) -> String {
        self.url_template
            .replace("{query}", &urlencoding::encode(query))
    }

    pub fn settle_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.settle_ms),
            Duration::from_millis(self.settle_ms + self.settle_jitter_ms),
        )
    }
}

/// One row of the curated fallback table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEntry {
    pub keyword: String,
    pub results: Vec<SearchResult>,
}

fn link(url: &str, title: &str) -> SearchResult {
    SearchResult {
        url: url.into(),
        title: title.into(),
    }
}

/// Search provider chain and result filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub engines: Vec<EngineProfile>,
    /// Excluded for every engine: the origin site and video hosts.
    pub excluded_domains: Vec<String>,
    /// URL tokens marking a page as article-like.
    pub article_tokens: Vec<String>,
    /// Keyword-containment table, first match wins.
    pub fallback: Vec<FallbackEntry>,
    pub default_fallback: Vec<SearchResult>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let sprinklr = link(
            "https://www.sprinklr.com/blog/livechat-vs-chatbot/",
            "Live Chat vs Chatbot - Sprinklr",
        );
        let brevo = link(
            "https://www.brevo.com/blog/chatbot-vs-live-chat/",
            "Chatbot vs Live Chat - Brevo",
        );
        Self {
            engines: vec![
                EngineProfile::google(),
                EngineProfile::bing(),
                EngineProfile::duckduckgo(),
            ],
            excluded_domains: strings(&["beyondchats.com", "youtube.com"]),
            article_tokens: strings(&["blog", "article", "post", "news", "guide", "tutorial", "story"]),
            fallback: vec![
                FallbackEntry {
                    keyword: "chatbot".into(),
                    results: vec![sprinklr.clone(), brevo.clone()],
                },
                FallbackEntry {
                    keyword: "live chat".into(),
                    results: vec![
                        link(
                            "https://www.chatbot.com/blog/chatbot-vs-livechat/",
                            "Chatbot vs Live Chat - ChatBot.com",
                        ),
                        link(
                            "https://getvoip.com/blog/chatbots-vs-live-chat/",
                            "Chatbots vs Live Chat - GetVoIP",
                        ),
                    ],
                },
                FallbackEntry {
                    keyword: "customer support".into(),
                    results: vec![
                        link(
                            "https://www.gorgias.com/blog/chatbot-vs-live-chat",
                            "Chatbot vs Live Chat - Gorgias",
                        ),
                        link(
                            "https://hiverhq.com/blog/chatbot-vs-live-chat-what-to-choose",
                            "Chatbot vs Live Chat - Hiver",
                        ),
                    ],
                },
                FallbackEntry {
                    keyword: "ai".into(),
                    results: vec![
                        link(
                            "https://www.8x8.com/blog/ai-chatbot-vs-live-chat",
                            "AI Chatbot vs Live Chat - 8x8",
                        ),
                        link(
                            "https://livechatai.com/blog/chatbot-vs-live-chat",
                            "Chatbot vs Live Chat - LiveChatAI",
                        ),
                    ],
                },
            ],
            default_fallback: vec![sprinklr, brevo],
        }
    }
}

/// Rewrite Orchestrator limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteSettings {
    pub reference_char_cap: usize,
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    /// Scraped references at or below this many characters are discarded.
    pub min_reference_chars: usize,
    pub request_timeout_secs: u64,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            reference_char_cap: 3000,
            max_attempts: 3,
            base_backoff_secs: 60,
            min_reference_chars: 100,
            request_timeout_secs: 120,
        }
    }
}

impl RewriteSettings {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub pace_secs: u64,
    pub results: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pace_secs: 30,
            results: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub fetch_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    /// Desktop user agents rotated by the rendering context.
    pub user_agents: Vec<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 15,
            navigation_timeout_secs: 30,
            user_agents: strings(&[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
            ]),
        }
    }
}

impl NetworkSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Blog index URL with a `{page}` placeholder.
    pub index_url_template: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            index_url_template: "https://beyondchats.com/blogs/page/{page}/".into(),
        }
    }
}

impl IngestSettings {
    pub fn index_url(&self, page: u32) -> String {
        self.index_url_template.replace("{page}", &page.to_string())
    }
}

impl Settings {
    /// Load settings from `path`, or the built-in defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
                let settings = Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
                    path: path.to_string(),
                    source,
                })?;
                info!(path, "Loaded settings file");
                settings
            }
            None => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Compile every selector once so a bad template fails at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let listing = &self.listing;
        for (field, chain) in [
            ("listing.items", &listing.items),
            ("listing.title_link", &listing.title_link),
            ("listing.image", &listing.image),
            ("listing.excerpt", &listing.excerpt),
            ("listing.author", &listing.author),
            ("listing.date", &listing.date),
            ("extractor.strip", &self.extractor.strip),
            ("extractor.content_selectors", &self.extractor.content_selectors),
        ] {
            SelectorChain::parse(field, chain)?;
        }
        SelectorChain::parse(
            "extractor.paragraph_selector",
            std::slice::from_ref(&self.extractor.paragraph_selector),
        )?;
        SelectorChain::parse(
            "extractor.heading_selector",
            std::slice::from_ref(&self.extractor.heading_selector),
        )?;

        for engine in &self.search.engines {
            let field = format!("search.engines.{}", engine.name);
            if !engine.url_template.contains("{query}") {
                return Err(ConfigError::Missing(format!(
                    "{field}.url_template has no {{query}} placeholder"
                )));
            }
            SelectorChain::parse(&field, &engine.containers)?;
            SelectorChain::parse(&field, &engine.title)?;
            SelectorChain::parse(&field, std::slice::from_ref(&engine.generic_scan))?;
            if let Some(link) = &engine.link {
                SelectorChain::parse(&field, std::slice::from_ref(link))?;
            }
        }

        if self.search.default_fallback.is_empty() {
            return Err(ConfigError::Missing(
                "search.default_fallback must list at least one link".into(),
            ));
        }
        Ok(())
    }
}
