//! Small string and date helpers shared across modules.
//!
//! - String truncation for logging and for prompt/excerpt caps
//! - Slugification and HTML escaping
//! - Best-effort parsing of free-form date text from blog index pages

use chrono::NaiveDate;

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (moved back to a character boundary)
/// with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let head = truncate_bytes(s, max);
        format!("{}…(+{} bytes)", head, s.len() - head.len())
    }
}

/// Cut `s` to at most `max_bytes` bytes without splitting a character.
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Keep at most `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Convert a title to a URL-friendly slug.
///
/// Lowercases, drops everything that is not alphanumeric, and joins the
/// remaining words with single hyphens.
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("Chatbots vs. Live Chat!"), "chatbots-vs-live-chat");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Escape text for inclusion in HTML element content or a quoted attribute.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the date text shown on blog index cards into `YYYY-MM-DD`.
///
/// Returns `None` when no known layout matches; callers store no date then.
pub fn parse_date_text(text: &str) -> Option<String> {
    const LAYOUTS: &[&str] = &[
        "%Y-%m-%d",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d %B %Y",
        "%d %b %Y",
        "%d/%m/%Y",
        "%m/%d/%Y",
    ];

    let cleaned = squash_whitespace(text);
    let cleaned = cleaned.trim_end_matches('.');
    // ISO timestamps: keep the date part only.
    let candidate = cleaned.get(..10).filter(|head| head.as_bytes().get(4) == Some(&b'-'));

    LAYOUTS.iter().find_map(|layout| {
        NaiveDate::parse_from_str(candidate.unwrap_or(cleaned), layout)
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string())
    })
}
