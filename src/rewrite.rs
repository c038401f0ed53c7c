//! Rewrite orchestration: prompt construction and the model call.
//!
//! The prompt is a pure function of the request. A request with references
//! gets the reference-grounded template, each reference cut to a character
//! cap; a request without references gets the knowledge-only template. The
//! model returns body HTML only. Citations are appended by the caller.

use crate::api::Generate;
use crate::error::BackendError;
use crate::models::{ReferenceArticle, RewriteRequest};
use crate::utils::{truncate_chars, truncate_for_log};
use std::fmt::Write as _;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    ReferenceGrounded,
    KnowledgeOnly,
}

impl PromptMode {
    pub fn for_request(request: &RewriteRequest) -> Self {
        if request.references.is_empty() {
            PromptMode::KnowledgeOnly
        } else {
            PromptMode::ReferenceGrounded
        }
    }
}

/// Build the prompt for `request`, cutting each reference to `reference_cap` characters.
pub fn build_prompt(request: &RewriteRequest, reference_cap: usize) -> String {
    let original = &request.original;
    let mut prompt = String::new();

    match PromptMode::for_request(request) {
        PromptMode::ReferenceGrounded => {
            prompt.push_str(
                "You are a senior content writer. Rewrite the blog article below so it reads as well as \
                 the best-ranking articles on the same subject. The reference articles that follow were \
                 found through web search for the same topic.\n\n",
            );
            push_original(&mut prompt, &original.title, &original.content);
            prompt.push_str("REFERENCE ARTICLES:\n");
            let references: Vec<String> = request
                .references
                .iter()
                .enumerate()
                .map(|(i, r)| reference_block(i + 1, r, reference_cap))
                .collect();
            prompt.push_str(&references.join("\n---\n"));
            prompt.push_str(
                "\nGUIDELINES:\n\
                 1. Keep the central topic and message of the original article.\n\
                 2. Borrow useful structure, coverage and insights from the references; do not copy their sentences.\n\
                 3. Organize the piece with clear <h2> and <h3> headings, short paragraphs and lists where they help.\n\
                 4. Stay factually accurate.\n\
                 5. Do not add citations, source links or a reference list. Sources are attached separately.\n\n\
                 OUTPUT:\n\
                 Return only the article body as clean HTML. Do not include a title, <html>, <head> or <body> tags, or Markdown fences.",
            );
        }
        PromptMode::KnowledgeOnly => {
            prompt.push_str(
                "You are a senior content writer. Expand and improve the blog article below using your \
                 own knowledge of the subject.\n\n",
            );
            push_original(&mut prompt, &original.title, &original.content);
            prompt.push_str(
                "GUIDELINES:\n\
                 1. Expand the article substantially, to roughly 1500-2000 words.\n\
                 2. Add depth: practical examples, common pitfalls and current practice in the field.\n\
                 3. Organize the piece with clear <h2> and <h3> headings, short paragraphs and lists where they help.\n\
                 4. Only state things that can be verified. Do not invent statistics, quotes or studies.\n\n\
                 OUTPUT:\n\
                 Return only the article body as clean HTML. Do not include a title, <html>, <head> or <body> tags, or Markdown fences.",
            );
        }
    }
    prompt
}

fn push_original(prompt: &mut String, title: &str, content: &str) {
    let _ = write!(
        prompt,
        "ORIGINAL ARTICLE:\nTitle: {title}\nContent:\n{content}\n\n"
    );
}

fn reference_block(n: usize, reference: &ReferenceArticle, cap: usize) -> String {
    format!(
        "Reference {n}: \"{}\"\nURL: {}\nContent:\n{}\n",
        reference.title,
        reference.url,
        truncate_chars(&reference.content, cap)
    )
}

/// Strip a Markdown code fence some models wrap around HTML output.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("html").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Rewrite Orchestrator: owns the generative backend handle.
#[derive(Debug)]
pub struct Rewriter<G> {
    backend: G,
    reference_cap: usize,
}

impl<G: Generate> Rewriter<G> {
    /// # Arguments
    ///
    /// * `backend` - The generative backend, usually wrapped in retries
    /// * `reference_cap` - Characters kept from each reference in the prompt
    pub fn new(backend: G, reference_cap: usize) -> Self {
        Self {
            backend,
            reference_cap,
        }
    }

    /// Produce rewritten body HTML for `request`.
    #[instrument(level = "info", skip_all, fields(title = %request.original.title, references = request.references.len()))]
    pub async fn rewrite(&self, request: &RewriteRequest) -> Result<String, BackendError> {
        let mode = PromptMode::for_request(request);
        let prompt = build_prompt(request, self.reference_cap);
        info!(?mode, prompt_chars = prompt.chars().count(), "Calling generative backend");
        debug!(prompt = %truncate_for_log(&prompt, 500), "Prompt");

        let output = self.backend.generate(&prompt).await?;
        let body = strip_code_fence(&output).to_string();
        if body.is_empty() {
            return Err(BackendError::Fatal("model returned an empty article".into()));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedBackend;
    use crate::models::OriginalText;

    fn request(references: Vec<ReferenceArticle>) -> RewriteRequest {
        RewriteRequest {
            original: OriginalText {
                title: "Chatbots vs Live Chat".into(),
                content: "<p>Original body</p>".into(),
            },
            references,
        }
    }

    fn reference(n: usize, content: String) -> ReferenceArticle {
        ReferenceArticle {
            title: format!("Ref {n}"),
            content,
            url: format!("https://ref{n}.test/blog/post"),
        }
    }

    #[test]
    fn test_no_references_selects_knowledge_only() {
        let req = request(Vec::new());
        assert_eq!(PromptMode::for_request(&req), PromptMode::KnowledgeOnly);
        let prompt = build_prompt(&req, 3000);
        assert!(prompt.contains("1500-2000 words"));
        assert!(prompt.contains("Do not invent statistics"));
        assert!(!prompt.contains("REFERENCE ARTICLES"));
        assert!(prompt.contains("Title: Chatbots vs Live Chat"));
    }

    #[test]
    fn test_references_are_capped() {
        let long = "x".repeat(5000);
        let req = request(vec![reference(1, long), reference(2, "short body".into())]);
        assert_eq!(PromptMode::for_request(&req), PromptMode::ReferenceGrounded);

        let prompt = build_prompt(&req, 3000);
        assert!(prompt.contains(&"x".repeat(3000)));
        assert!(!prompt.contains(&"x".repeat(3001)));
        assert!(prompt.contains("Reference 2: \"Ref 2\""));
        assert!(prompt.contains("URL: https://ref1.test/blog/post"));
        assert!(prompt.contains("Do not add citations"));
    }

    #[test]
    fn test_cap_respects_multibyte_text() {
        let req = request(vec![reference(1, "é".repeat(10))]);
        let prompt = build_prompt(&req, 4);
        assert!(prompt.contains("Content:\néééé\n"));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```html\n<p>a</p>\n```"), "<p>a</p>");
        assert_eq!(strip_code_fence("  <p>a</p> "), "<p>a</p>");
    }

    #[tokio::test]
    async fn test_rewrite_returns_body() {
        let backend = ScriptedBackend::new(vec![Ok("```html\n<h2>New</h2>\n```".into())]);
        let rewriter = Rewriter::new(&backend, 3000);
        let body = rewriter.rewrite(&request(Vec::new())).await.unwrap();
        assert_eq!(body, "<h2>New</h2>");
    }

    #[tokio::test]
    async fn test_blank_output_is_fatal() {
        let backend = ScriptedBackend::new(vec![Ok("   ".into())]);
        let err = Rewriter::new(&backend, 3000)
            .rewrite(&request(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Fatal(_)));
    }
}
