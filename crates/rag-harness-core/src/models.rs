//! Core data models used throughout RAG Harness.
//!
//! These types represent the chunks, retrieved passages, web search hits,
//! and answer payloads that flow through the ingestion and query pipeline.
//! Every record is a named, typed struct; nothing downstream of the
//! collaborators handles untyped maps.

use serde::{Deserialize, Serialize};

/// Positional metadata for the document being chunked.
///
/// `page_starts` holds the character offset at which each page begins in
/// the concatenated document text (page 1 first). It is empty for sources
/// without page structure, in which case chunks carry no page number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub filename: String,
    pub page_starts: Vec<usize>,
}

impl DocumentMetadata {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            page_starts: Vec::new(),
        }
    }

    pub fn with_pages(filename: impl Into<String>, page_starts: Vec<usize>) -> Self {
        Self {
            filename: filename.into(),
            page_starts,
        }
    }

    /// 1-based page containing the character at `offset`, if page
    /// boundaries are known.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        if self.page_starts.is_empty() {
            return None;
        }
        let idx = self.page_starts.partition_point(|&start| start <= offset);
        Some(idx.max(1) as u32)
    }
}

/// A contiguous slice of a source document prepared for indexing.
///
/// Offsets are character (not byte) positions into the document's
/// concatenated text; `end_offset` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `{filename}_{chunk_index}`, unique within a collection.
    pub chunk_id: String,
    pub content: String,
    pub source_filename: String,
    pub page_number: Option<u32>,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A chunk returned from a similarity query, with its distance to the
/// query embedding (lower is more similar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub chunk: DocumentChunk,
    pub distance: f64,
}

/// A web search hit. `relevance_score` is provider-supplied and assumed to
/// be normalized to `[0, 1]` already.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub relevance_score: f64,
}

/// A source attributed in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    KnowledgeBase {
        filename: String,
        page_number: Option<u32>,
        chunk_number: usize,
        relevance_score: f64,
    },
    WebSearch {
        title: String,
        url: String,
        relevance_score: f64,
    },
}

impl Source {
    pub fn relevance_score(&self) -> f64 {
        match self {
            Source::KnowledgeBase {
                relevance_score, ..
            }
            | Source::WebSearch {
                relevance_score, ..
            } => *relevance_score,
        }
    }

    pub fn is_knowledge_base(&self) -> bool {
        matches!(self, Source::KnowledgeBase { .. })
    }
}

/// The complete answer to a non-streaming query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f64,
    pub used_web_search: bool,
}

/// Role of a chat message sent to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Aggregate counts reported by a vector store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub unique_files: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_at_without_pages() {
        let meta = DocumentMetadata::new("notes.txt");
        assert_eq!(meta.page_at(0), None);
        assert_eq!(meta.page_at(500), None);
    }

    #[test]
    fn test_page_at_boundaries() {
        let meta = DocumentMetadata::with_pages("guide.pdf", vec![0, 100, 250]);
        assert_eq!(meta.page_at(0), Some(1));
        assert_eq!(meta.page_at(99), Some(1));
        assert_eq!(meta.page_at(100), Some(2));
        assert_eq!(meta.page_at(249), Some(2));
        assert_eq!(meta.page_at(10_000), Some(3));
    }

    #[test]
    fn test_source_serializes_with_type_tag() {
        let kb = Source::KnowledgeBase {
            filename: "admin_guide.pdf".to_string(),
            page_number: Some(12),
            chunk_number: 5,
            relevance_score: 0.92,
        };
        let json = serde_json::to_value(&kb).unwrap();
        assert_eq!(json["type"], "knowledge_base");
        assert_eq!(json["filename"], "admin_guide.pdf");
        assert_eq!(json["page_number"], 12);

        let web = Source::WebSearch {
            title: "Docs".to_string(),
            url: "https://example.com".to_string(),
            relevance_score: 0.5,
        };
        let json = serde_json::to_value(&web).unwrap();
        assert_eq!(json["type"], "web_search");
        assert_eq!(json["url"], "https://example.com");
    }
}
