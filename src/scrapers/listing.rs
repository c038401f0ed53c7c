//! Blog index page parser.
//!
//! Candidate item nodes are picked with several structural selectors so that
//! small template changes do not break discovery. Each of the five fields is
//! then resolved independently through its own [`SelectorChain`]. Only the
//! title and link are required; an item without them is dropped.

use crate::config::ListingSettings;
use crate::error::ConfigError;
use crate::models::ArticleSummary;
use crate::scrapers::selectors::{element_text, SelectorChain};
use crate::utils::{squash_whitespace, truncate_chars};
use scraper::{ElementRef, Html};
use tracing::{debug, info, instrument};
use url::Url;

/// Parser for the blog's paginated index pages.
///
/// Each item must yield a title and a link; image, excerpt, author and date
/// are optional and taken from the first matching selector.
#[derive(Debug, Clone)]
pub struct ListParser {
    items: SelectorChain,
    title_link: SelectorChain,
    image: SelectorChain,
    excerpt: SelectorChain,
    author: SelectorChain,
    date: SelectorChain,
    excerpt_max_chars: usize,
}

impl ListParser {
    /// Compile every listing selector, failing on the first invalid one.
    pub fn new(settings: &ListingSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            items: SelectorChain::parse("listing.items", &settings.items)?,
            title_link: SelectorChain::parse("listing.title_link", &settings.title_link)?,
            image: SelectorChain::parse("listing.image", &settings.image)?,
            excerpt: SelectorChain::parse("listing.excerpt", &settings.excerpt)?,
            author: SelectorChain::parse("listing.author", &settings.author)?,
            date: SelectorChain::parse("listing.date", &settings.date)?,
            excerpt_max_chars: settings.excerpt_max_chars,
        })
    }

    /// Parse an index page into summaries, in document order.
    ///
    /// Relative links and image sources are resolved against `page_url`.
    #[instrument(level = "info", skip_all, fields(%page_url))]
    pub fn parse(&self, html: &str, page_url: &Url) -> Vec<ArticleSummary> {
        let document = Html::parse_document(html);
        let summaries: Vec<ArticleSummary> = self
            .items
            .select_all(document.root_element())
            .into_iter()
            .filter_map(|item| self.parse_item(item, page_url))
            .collect();

        info!(count = summaries.len(), "Parsed index page");
        summaries
    }

    fn parse_item(&self, item: ElementRef<'_>, page_url: &Url) -> Option<ArticleSummary> {
        let (title, url) = self.title_link.first_map(item, |anchor| {
            let title = squash_whitespace(&element_text(anchor));
            let href = anchor.value().attr("href")?.trim();
            if title.is_empty() || href.is_empty() {
                return None;
            }
            let url = page_url.join(href).ok()?;
            Some((title, url.to_string()))
        })?;

        let image_url = self.image.first_map(item, |img| {
            let value = img.value();
            let src = value
                .attr("src")
                .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
                .or_else(|| value.attr("data-src"))?;
            page_url.join(src.trim()).ok().map(|u| u.to_string())
        });

        let excerpt = self.text_field(&self.excerpt, item).map(|text| {
            truncate_chars(&text, self.excerpt_max_chars)
                .trim()
                .to_string()
        });
        let author = self.text_field(&self.author, item);
        let date_text = self.text_field(&self.date, item).or_else(|| {
            self.date
                .first(item)
                .and_then(|el| el.value().attr("datetime").map(str::to_string))
        });

        debug!(%title, %url, "Parsed index item");
        Some(ArticleSummary {
            title,
            url,
            image_url,
            excerpt,
            author,
            date_text,
        })
    }

    fn text_field(&self, chain: &SelectorChain, item: ElementRef<'_>) -> Option<String> {
        chain.first(item).map(|el| squash_whitespace(&element_text(el))).filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
        <html><body>
          <article class="entry">
            <img data-src="/img/chat.png">
            <h2><a href="/blogs/chatbots-vs-live-chat/">  Chatbots vs
               Live Chat </a></h2>
            <p>Which one should your support team pick this year?</p>
            <span class="author-name">Jane Doe</span>
            <span class="post-date">December 25, 2024</span>
          </article>
          <article class="entry">
            <p>An item with no heading link is skipped.</p>
          </article>
          <div class="blog-item">
            <a class="entry-title" href="https://beyondchats.com/blogs/ai-support/">AI Support</a>
            <img src="https://cdn.example.com/ai.jpg">
            <time datetime="2024-11-02">2 Nov 2024</time>
          </div>
        </body></html>
    "#;

    fn parser() -> ListParser {
        ListParser::new(&ListingSettings::default()).unwrap()
    }

    #[test]
    fn test_parse_index_in_document_order() {
        let base = Url::parse("https://beyondchats.com/blogs/page/15/").unwrap();
        let items = parser().parse(INDEX, &base);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "Chatbots vs Live Chat");
        assert_eq!(first.url, "https://beyondchats.com/blogs/chatbots-vs-live-chat/");
        assert_eq!(first.image_url.as_deref(), Some("https://beyondchats.com/img/chat.png"));
        assert_eq!(
            first.excerpt.as_deref(),
            Some("Which one should your support team pick this year?")
        );
        assert_eq!(first.author.as_deref(), Some("Jane Doe"));
        assert_eq!(first.date_text.as_deref(), Some("December 25, 2024"));

        let second = &items[1];
        assert_eq!(second.title, "AI Support");
        assert_eq!(second.image_url.as_deref(), Some("https://cdn.example.com/ai.jpg"));
        assert_eq!(second.excerpt, None);
        assert_eq!(second.date_text.as_deref(), Some("2 Nov 2024"));
    }

    #[test]
    fn test_excerpt_is_capped() {
        let long = "word ".repeat(200);
        let html = format!(
            r#"<article><h3><a href="/x">Long one</a></h3><p>{long}</p></article>"#
        );
        let base = Url::parse("https://beyondchats.com/").unwrap();
        let items = parser().parse(&html, &base);
        assert!(items[0].excerpt.as_ref().unwrap().chars().count() <= 300);
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let base = Url::parse("https://beyondchats.com/").unwrap();
        assert!(parser().parse("<html><body></body></html>", &base).is_empty());
    }
}
