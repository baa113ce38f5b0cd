//! Prompt context composition.
//!
//! Turns retrieved knowledge-base passages and optional web search results
//! into the chat messages handed to the generation service, and into the
//! ranked source list returned with an answer.
//!
//! # Prompt layout
//!
//! ```text
//! system: <assistant guidelines>
//! user:   Internal Knowledge Base:            (or the "none found" line)
//!
//!         [Source 1: guide.pdf, Page 3]
//!         <passage text>
//!         ...
//!         Web Search Results:                 (only when results exist)
//!
//!         1. <title>
//!            Source: <url>
//!            <snippet>
//!         ...
//!         User Question: <query>
//!
//!         Please provide a helpful answer based on the context above:
//! ```
//!
//! Internal documentation always precedes web results; the guidelines tell
//! the model to prefer it when the two disagree.
//!
//! # Source list
//!
//! At most [`MAX_KB_SOURCES`] knowledge-base sources (retrieval order)
//! followed by at most [`MAX_WEB_SOURCES`] web sources (provider order).

use crate::confidence::display_confidence;
use crate::models::{ChatMessage, RetrievedPassage, SearchResult, Source};

pub const MAX_KB_SOURCES: usize = 3;
pub const MAX_WEB_SOURCES: usize = 3;

/// Shown instead of the knowledge-base block when nothing was retrieved.
pub const NO_KB_CONTEXT: &str = "No relevant internal documentation found.";

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant for a product support chatbot. \
Your role is to answer user questions accurately using the provided context from product \
documentation and web search results.

Guidelines:
- Always prioritize information from the Internal Knowledge Base (product documentation)
- Use web search results to supplement or provide additional context when needed
- If the answer is not in the provided context, clearly state that you don't have that information
- Be concise but comprehensive in your answers
- If referencing specific sources, mention them
- Maintain a professional and friendly tone";

/// Prompt messages and attributed sources for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedContext {
    pub messages: Vec<ChatMessage>,
    pub sources: Vec<Source>,
}

/// Build the prompt and source list. Pure: identical inputs always yield
/// identical output.
pub fn compose(
    query: &str,
    passages: &[RetrievedPassage],
    search_results: &[SearchResult],
) -> ComposedContext {
    let mut user_parts = vec![knowledge_base_block(passages), String::new()];

    if !search_results.is_empty() {
        user_parts.push(web_search_block(search_results));
        user_parts.push(String::new());
    }

    user_parts.push(format!("User Question: {}", query));
    user_parts.push("\nPlease provide a helpful answer based on the context above:".to_string());

    ComposedContext {
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_parts.join("\n")),
        ],
        sources: compose_sources(passages, search_results),
    }
}

/// Labelled knowledge-base block, or [`NO_KB_CONTEXT`] when empty.
pub fn knowledge_base_block(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return NO_KB_CONTEXT.to_string();
    }

    let mut parts = vec!["Internal Knowledge Base:\n".to_string()];
    for (i, passage) in passages.iter().enumerate() {
        let page = passage
            .chunk
            .page_number
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        parts.push(format!(
            "[Source {}: {}, Page {}]",
            i + 1,
            passage.chunk.source_filename,
            page
        ));
        parts.push(passage.chunk.content.clone());
        parts.push(String::new());
    }
    parts.join("\n")
}

/// Labelled web search block. Empty string when there are no results.
pub fn web_search_block(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut parts = vec!["Web Search Results:\n".to_string()];
    for (i, result) in results.iter().enumerate() {
        parts.push(format!("{}. {}", i + 1, result.title));
        parts.push(format!("   Source: {}", result.url));
        parts.push(format!("   {}\n", result.content));
    }
    parts.join("\n")
}

/// Top knowledge-base sources first, then top web sources.
pub fn compose_sources(passages: &[RetrievedPassage], search_results: &[SearchResult]) -> Vec<Source> {
    let kb = passages.iter().take(MAX_KB_SOURCES).map(|p| Source::KnowledgeBase {
        filename: p.chunk.source_filename.clone(),
        page_number: p.chunk.page_number,
        chunk_number: p.chunk.chunk_index,
        relevance_score: display_confidence(p.distance),
    });

    let web = search_results
        .iter()
        .take(MAX_WEB_SOURCES)
        .map(|r| Source::WebSearch {
            title: r.title.clone(),
            url: r.url.clone(),
            relevance_score: r.relevance_score,
        });

    kb.chain(web).collect()
}
