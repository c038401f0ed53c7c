//! Article body extraction.
//!
//! Boilerplate (scripts, navigation, ads, comment blocks) is excluded from
//! every path before any heuristic looks at the page. Extraction then runs
//! through a fixed fallback order:
//!
//! 1. Paragraph aggregation: every long-enough `<p>` in document order, with
//!    `<h2>`/`<h3>` headings prepended, when the aggregate is long enough.
//! 2. Content containers from the configured selector chain, returned as
//!    cleaned HTML.
//! 3. Whatever the paragraph aggregate held, or [`UNEXTRACTABLE`].
//!
//! None of these steps can fail; the worst result is a sentinel string.

use crate::config::ExtractorSettings;
use crate::error::ConfigError;
use crate::models::ExtractedArticle;
use crate::scrapers::selectors::SelectorChain;
use crate::utils::{escape_html, squash_whitespace};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

/// Content returned when no path produced any text.
pub const UNEXTRACTABLE: &str = "Content could not be extracted.";
/// Content returned when the page could not be fetched at all.
pub const FETCH_FAILED: &str = "Failed to extract content";
/// Title returned alongside [`FETCH_FAILED`].
pub const UNKNOWN_TITLE: &str = "Unknown";

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));
static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("static regex"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("static regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static GAP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").expect("static regex"));

/// Which pages an extractor is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractProfile {
    /// The blog's own article pages.
    Source,
    /// Third-party pages found through search.
    Reference,
}

/// Article body extractor compiled from [`ExtractorSettings`].
///
/// Every selector is parsed once at construction; extraction itself cannot
/// fail.
#[derive(Debug, Clone)]
pub struct Extractor {
    /// Boilerplate regions excluded from every extraction path.
    strip: SelectorChain,
    /// Content containers tried in order by the container fallback.
    content: SelectorChain,
    paragraphs: SelectorChain,
    headings: SelectorChain,
    heading_min_chars: usize,
    heading_max_chars: usize,
    min_total_chars: usize,
    min_paragraph_chars: usize,
}

impl Extractor {
    /// Compile the settings for one page profile.
    ///
    /// # Arguments
    ///
    /// * `settings` - Strip list, container chain and thresholds
    /// * `profile` - Selects the per-paragraph minimum length
    ///
    /// # Returns
    ///
    /// A [`ConfigError::Selector`] naming the field when a selector is invalid.
    pub fn new(settings: &ExtractorSettings, profile: ExtractProfile) -> Result<Self, ConfigError> {
        let min_paragraph_chars = match profile {
            ExtractProfile::Source => settings.source_min_paragraph_chars,
            ExtractProfile::Reference => settings.reference_min_paragraph_chars,
        };
        Ok(Self {
            strip: SelectorChain::parse("extractor.strip", &settings.strip)?,
            content: SelectorChain::parse(
                "extractor.content_selectors",
                &settings.content_selectors,
            )?,
            paragraphs: SelectorChain::parse(
                "extractor.paragraph_selector",
                std::slice::from_ref(&settings.paragraph_selector),
            )?,
            headings: SelectorChain::parse(
                "extractor.heading_selector",
                std::slice::from_ref(&settings.heading_selector),
            )?,
            heading_min_chars: settings.heading_min_chars,
            heading_max_chars: settings.heading_max_chars,
            min_total_chars: settings.min_total_chars,
            min_paragraph_chars,
        })
    }

    /// Turn a fetched page into an article record. Never returns empty content.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub fn extract(&self, html: &str, url: &str) -> ExtractedArticle {
        let document = Html::parse_document(html);
        let title = self.title(&document).unwrap_or_else(|| url.to_string());
        let content = self.content(&document);
        debug!(%title, chars = content.chars().count(), "Extracted article");
        ExtractedArticle {
            title,
            content,
            url: url.to_string(),
        }
    }

    /// First `<h1>` outside boilerplate, then `og:title`, then `<title>`.
    pub fn title(&self, document: &Html) -> Option<String> {
        let non_empty = |s: String| (!s.is_empty()).then_some(s);

        document
            .select(&H1)
            .filter(|h1| !self.strip.within(h1))
            .find_map(|h1| non_empty(self.visible_text(h1)))
            .or_else(|| {
                document
                    .select(&OG_TITLE)
                    .find_map(|meta| meta.value().attr("content"))
                    .map(squash_whitespace)
                    .and_then(non_empty)
            })
            .or_else(|| {
                document
                    .select(&TITLE)
                    .next()
                    .map(|t| squash_whitespace(&t.text().collect::<String>()))
                    .and_then(non_empty)
            })
    }

    fn content(&self, document: &Html) -> String {
        let root = document.root_element();

        let mut paragraphs = String::new();
        let mut paragraph_chars = 0usize;
        for p in self.paragraphs.select_all(root) {
            if self.strip.within(&p) {
                continue;
            }
            let text = self.visible_text(p);
            let chars = text.chars().count();
            if chars > self.min_paragraph_chars {
                paragraph_chars += chars;
                paragraphs.push_str(&format!("<p>{}</p>\n", escape_html(&text)));
            }
        }

        if paragraph_chars > self.min_total_chars {
            let mut headings = String::new();
            for h in self.headings.select_all(root) {
                if self.strip.within(&h) {
                    continue;
                }
                let text = self.visible_text(h);
                let chars = text.chars().count();
                if chars > self.heading_min_chars && chars < self.heading_max_chars {
                    let tag = h.value().name();
                    headings.push_str(&format!("<{tag}>{}</{tag}>\n", escape_html(&text)));
                }
            }
            debug!(paragraph_chars, "Using paragraph aggregation");
            return headings + &paragraphs;
        }

        if let Some(container) = self.container(root) {
            return container;
        }

        if paragraphs.is_empty() {
            UNEXTRACTABLE.to_string()
        } else {
            paragraphs
        }
    }

    /// First configured container whose visible text is long enough, as cleaned HTML.
    fn container(&self, root: ElementRef<'_>) -> Option<String> {
        self.content.alternatives().find_map(|selector| {
            let candidate = root.select(selector).find(|el| !self.strip.within(el))?;
            let chars = self.visible_text(candidate).chars().count();
            if chars <= self.min_total_chars {
                return None;
            }
            let cleaned = clean_html(&self.without_boilerplate(candidate));
            debug!(chars, "Using content container");
            (!cleaned.is_empty()).then_some(cleaned)
        })
    }

    /// Serialized element with every outermost boilerplate descendant cut out.
    fn without_boilerplate(&self, element: ElementRef<'_>) -> String {
        let mut html = element.html();
        let outermost = element
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .filter(|el| self.strip.matches(el))
            .filter(|el| {
                el.parent()
                    .and_then(ElementRef::wrap)
                    .is_none_or(|parent| !self.strip.within(&parent))
            });
        for el in outermost {
            html = html.replacen(&el.html(), "", 1);
        }
        html
    }

    /// Text of `element` skipping boilerplate subtrees, whitespace squashed.
    fn visible_text(&self, element: ElementRef<'_>) -> String {
        let mut out = String::new();
        self.collect_text(element, &mut out);
        squash_whitespace(&out)
    }

    fn collect_text(&self, element: ElementRef<'_>, out: &mut String) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(text);
            } else if let Some(child) = ElementRef::wrap(child) {
                if !self.strip.matches(&child) {
                    self.collect_text(child, out);
                }
            }
        }
    }
}

/// Record returned for pages that could not be fetched.
pub fn fetch_failure(url: &str) -> ExtractedArticle {
    ExtractedArticle {
        title: UNKNOWN_TITLE.to_string(),
        content: FETCH_FAILED.to_string(),
        url: url.to_string(),
    }
}

/// Remove inline scripts and styles and normalize whitespace.
///
/// Applying this twice gives the same output as applying it once.
pub fn clean_html(html: &str) -> String {
    let mut out = html.to_string();
    loop {
        let next = STYLE_RE.replace_all(&SCRIPT_RE.replace_all(&out, ""), "").into_owned();
        if next == out {
            break;
        }
        out = next;
    }
    let out = WS_RE.replace_all(&out, " ");
    let out = GAP_RE.replace_all(&out, "><");
    out.trim().to_string()
}
