//! Web search abstraction.
//!
//! Web search is a best-effort enhancement. [`WebSearch::search`] therefore
//! has no error channel: implementations log failures and return an empty
//! list, which the pipeline treats exactly like "search not performed".

use async_trait::async_trait;

use crate::models::SearchResult;

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Provider name reported in stats (e.g. `"tavily"`).
    fn provider_name(&self) -> &str;

    /// Up to `max_results` hits for `query`; empty on any failure.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

/// Search provider used when web search is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSearch;

#[async_trait]
impl WebSearch for DisabledSearch {
    fn provider_name(&self) -> &str {
        "disabled"
    }

    async fn search(&self, _query: &str, _max_results: usize) -> Vec<SearchResult> {
        Vec::new()
    }
}
