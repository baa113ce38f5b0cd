//! Tavily web search.
//!
//! Web results only supplement the knowledge base, so every failure here
//! (missing key, transport error, timeout, bad status, malformed body) is
//! logged and turned into an empty result list.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use rag_harness_core::models::SearchResult;
use rag_harness_core::web_search::{DisabledSearch, WebSearch};

use crate::config::SearchConfig;

pub struct TavilySearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

impl From<TavilyResult> for SearchResult {
    fn from(r: TavilyResult) -> Self {
        SearchResult {
            title: r.title.unwrap_or_else(|| "No title".to_string()),
            url: r.url,
            content: r.content,
            relevance_score: r.score,
        }
    }
}

impl TavilySearch {
    /// Build from `[search]`, reading the key from `TAVILY_API_KEY`.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY").ok();
        if api_key.is_none() {
            warn!("TAVILY_API_KEY not set; web search will return no results");
        }
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &SearchConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/search", config.url.trim_end_matches('/')),
            api_key,
        })
    }

    async fn try_search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let Some(api_key) = &self.api_key else {
            bail!("TAVILY_API_KEY not set");
        };

        let body = json!({
            "query": query,
            "max_results": max_results,
            "search_depth": "basic",
            "include_answer": true,
            "include_raw_content": false,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("search API error {}: {}", status, text);
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .context("invalid search response")?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(SearchResult::from)
            .collect())
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    fn provider_name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let preview: String = query.chars().take(100).collect();
        info!(query = %preview, "performing web search");

        match self.try_search(query, max_results).await {
            Ok(results) => {
                info!(found = results.len(), "web search complete");
                results
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "web search failed, continuing without it");
                Vec::new()
            }
        }
    }
}

pub fn create_search(config: &SearchConfig) -> Result<Arc<dyn WebSearch>> {
    match config.provider.as_str() {
        "tavily" => Ok(Arc::new(TavilySearch::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledSearch)),
        other => bail!("Unknown search provider: {}", other),
    }
}
