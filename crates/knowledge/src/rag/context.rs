//! Context assembly for grounded answers.

use crate::rag::types::ContextArticle;
use crate::types::{Article, ScoredArticle};
use unicode_segmentation::UnicodeSegmentation;

/// Turn ranked articles into context entries, preserving order.
pub fn assemble_context(results: &[ScoredArticle], snippet_chars: usize) -> Vec<ContextArticle> {
    results
        .iter()
        .map(|hit| ContextArticle {
            article_id: hit.article.id.clone(),
            title: hit.article.title.clone(),
            snippet: snippet(&hit.article, snippet_chars),
            score: hit.score,
        })
        .collect()
}

/// Render context entries as prompt text, each labelled by its title.
pub fn render_context(articles: &[ContextArticle]) -> String {
    articles
        .iter()
        .map(|a| format!("## {}\n{}", a.title, a.snippet))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// The article's summary, or the start of its body cut to at most
/// `max_chars` characters.
pub fn snippet(article: &Article, max_chars: usize) -> String {
    match article.summary.as_deref().map(str::trim) {
        Some(summary) if !summary.is_empty() => summary.to_string(),
        _ => truncate_snippet(article.body.trim(), max_chars),
    }
}

/// Cut `text` to `max_chars` grapheme clusters, backing off to the last word
/// boundary and appending `...` when anything was removed.
fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let cut = match text.grapheme_indices(true).nth(max_chars) {
        Some((byte_idx, _)) => byte_idx,
        None => return text.to_string(),
    };

    let truncated = &text[..cut];
    let truncated = match truncated.rfind(char::is_whitespace) {
        Some(last_space) if last_space > 0 => truncated[..last_space].trim_end(),
        _ => truncated,
    };

    format!("{}...", truncated)
}
