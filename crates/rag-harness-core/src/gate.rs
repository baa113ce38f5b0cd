//! Web-search gating.
//!
//! Decides whether knowledge-base retrieval alone is good enough or whether
//! the query should be supplemented with a web search. Only the single best
//! passage matters here; deeper passages still reach the prompt and the
//! source list.

use crate::confidence::distance_to_confidence;
use crate::models::RetrievedPassage;

/// Default confidence below which web search is triggered.
pub const DEFAULT_SEARCH_THRESHOLD: f64 = 0.7;

/// Returns `true` when web search should run.
///
/// - No passages: always search.
/// - Otherwise: search iff the confidence of the first passage (the store
///   returns passages in ascending distance order) is strictly below
///   `threshold`.
pub fn should_search(passages: &[RetrievedPassage], threshold: f64) -> bool {
    match passages.first() {
        None => true,
        Some(top) => distance_to_confidence(top.distance) < threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;

    fn passage(distance: f64) -> RetrievedPassage {
        RetrievedPassage {
            chunk: DocumentChunk {
                chunk_id: "guide.pdf_0".to_string(),
                content: "Some text".to_string(),
                source_filename: "guide.pdf".to_string(),
                page_number: None,
                chunk_index: 0,
                start_offset: 0,
                end_offset: 9,
            },
            distance,
        }
    }

    #[test]
    fn test_empty_always_searches() {
        assert!(should_search(&[], 0.0));
        assert!(should_search(&[], 0.7));
        assert!(should_search(&[], 1.0));
    }

    #[test]
    fn test_threshold_boundary() {
        let results = vec![passage(0.4)];
        assert!(!should_search(&results, 0.7));
        assert!(should_search(&results, 0.85));
        // Equal confidence does not trigger search.
        assert!(!should_search(&results, 0.8));
    }

    #[test]
    fn test_only_top_result_counts() {
        let results = vec![passage(0.1), passage(1.9), passage(1.9)];
        assert!(!should_search(&results, 0.7));

        let results = vec![passage(1.5), passage(0.0)];
        assert!(should_search(&results, 0.7));
    }
}
