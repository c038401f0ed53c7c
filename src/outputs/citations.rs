//! "References" block appended to enhanced article bodies.

use crate::models::Citation;
use crate::utils::escape_html;

/// Render the references list, or an empty string when there are none.
///
/// Output depends only on the input, in order, so republishing the same
/// references produces byte-identical HTML.
pub fn render_citations(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }

    let items: Vec<String> = citations
        .iter()
        .map(|c| {
            format!(
                "<li><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></li>",
                escape_html(&c.url),
                escape_html(&c.title)
            )
        })
        .collect();

    format!(
        "\n<hr>\n<h3>References</h3>\n<p>This article was enhanced using insights from the following sources:</p>\n<ul>\n{}\n</ul>\n",
        items.join("\n")
    )
}
