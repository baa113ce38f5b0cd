//! Retrieval-fusion orchestrator.
//!
//! Runs one query through the fixed sequence
//!
//! ```text
//! RETRIEVE → GATE → (SEARCH) → GENERATE → ASSEMBLE
//! ```
//!
//! with no retries and no backward transitions. The pipeline holds only
//! shared handles to its collaborators, so one instance serves any number
//! of concurrent requests.
//!
//! [`RagPipeline::query`] and [`RagPipeline::query_stream`] share every step
//! up to generation; they differ only in how the answer is delivered. The
//! streaming path forwards fragments as they arrive and does not assemble
//! sources or confidence.
//!
//! # Failure semantics
//!
//! | Stage | On failure |
//! |-------|-----------|
//! | validation | [`RagError::InvalidRequest`] |
//! | RETRIEVE (embed + vector query) | [`RagError::Retrieval`] |
//! | SEARCH | absorbed: continues without web context |
//! | GENERATE | [`RagError::Generation`] |

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::compose::{compose, ComposedContext};
use crate::confidence::display_confidence;
use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::gate::{should_search, DEFAULT_SEARCH_THRESHOLD};
use crate::generation::{Generator, TextStream};
use crate::models::{RagResponse, RetrievedPassage};
use crate::store::VectorStore;
use crate::web_search::WebSearch;

/// Smallest accepted `num_results`.
pub const MIN_NUM_RESULTS: usize = 1;
/// Largest accepted `num_results`.
pub const MAX_NUM_RESULTS: usize = 10;

/// Defaults applied when a request leaves a knob unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub default_num_results: usize,
    pub search_threshold: f64,
    pub max_search_results: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_num_results: 5,
            search_threshold: DEFAULT_SEARCH_THRESHOLD,
            max_search_results: 5,
        }
    }
}

/// One user query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    /// Allow web search when the knowledge base looks insufficient.
    pub use_search: bool,
    /// Passages to retrieve (1–10); `None` uses the pipeline default.
    pub num_results: Option<usize>,
    /// Confidence below which web search runs; `None` uses the default.
    pub search_threshold: Option<f64>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            use_search: true,
            num_results: None,
            search_threshold: None,
        }
    }

    pub fn use_search(mut self, use_search: bool) -> Self {
        self.use_search = use_search;
        self
    }

    pub fn num_results(mut self, num_results: usize) -> Self {
        self.num_results = Some(num_results);
        self
    }

    pub fn search_threshold(mut self, threshold: f64) -> Self {
        self.search_threshold = Some(threshold);
        self
    }
}

/// Knowledge-base figures reported by [`RagPipeline::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorStoreStats {
    pub total_chunks: usize,
    pub unique_files: usize,
    pub collection_name: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub vector_store: VectorStoreStats,
    pub llm_model: String,
    pub search_provider: String,
}

/// Everything decided before generation.
struct PreparedQuery {
    passages: Vec<RetrievedPassage>,
    context: ComposedContext,
    used_web_search: bool,
}

/// The retrieval-fusion pipeline.
#[derive(Clone)]
pub struct RagPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    search: Arc<dyn WebSearch>,
    settings: PipelineSettings,
}

impl RagPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        search: Arc<dyn WebSearch>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            search,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer a query with sources, confidence, and the web-search flag.
    pub async fn query(&self, request: &QueryRequest) -> Result<RagResponse, RagError> {
        let prepared = self.prepare(request).await?;

        info!(query = %preview(&request.query), "generating answer");
        let answer = self
            .generator
            .generate(&prepared.context.messages)
            .await
            .map_err(RagError::Generation)?;

        let confidence = prepared
            .passages
            .first()
            .map(|p| display_confidence(p.distance))
            .unwrap_or(0.0);

        info!(
            confidence,
            used_web_search = prepared.used_web_search,
            sources = prepared.context.sources.len(),
            "query processed"
        );

        Ok(RagResponse {
            answer,
            sources: prepared.context.sources,
            confidence,
            used_web_search: prepared.used_web_search,
        })
    }

    /// Answer a query as a stream of text fragments.
    ///
    /// Retrieval and gating complete before this returns, so their failures
    /// surface as `Err` here rather than mid-stream. Dropping the returned
    /// stream cancels generation.
    pub async fn query_stream(&self, request: &QueryRequest) -> Result<TextStream, RagError> {
        let prepared = self.prepare(request).await?;

        info!(query = %preview(&request.query), "starting streamed answer");
        self.generator
            .generate_stream(&prepared.context.messages)
            .await
            .map_err(RagError::Generation)
    }

    pub async fn stats(&self) -> anyhow::Result<PipelineStats> {
        let store_stats = self.store.stats().await?;
        Ok(PipelineStats {
            vector_store: VectorStoreStats {
                total_chunks: store_stats.total_chunks,
                unique_files: store_stats.unique_files,
                collection_name: self.store.collection().to_string(),
                embedding_model: self.embedder.model_name().to_string(),
                embedding_dimension: self.embedder.dims(),
            },
            llm_model: self.generator.model_name().to_string(),
            search_provider: self.search.provider_name().to_string(),
        })
    }

    /// Validation, RETRIEVE, GATE, SEARCH and composition.
    async fn prepare(&self, request: &QueryRequest) -> Result<PreparedQuery, RagError> {
        let (num_results, threshold) = self.validate(request)?;
        info!(query = %preview(&request.query), num_results, "processing query");

        let embedding = self
            .embedder
            .embed(&request.query)
            .await
            .map_err(RagError::Retrieval)?;
        let passages = self
            .store
            .query(&embedding, num_results)
            .await
            .map_err(RagError::Retrieval)?;
        info!(found = passages.len(), "knowledge base retrieval complete");

        let search_results = if request.use_search && should_search(&passages, threshold) {
            info!(threshold, "knowledge base confidence low, performing web search");
            let results = self
                .search
                .search(&request.query, self.settings.max_search_results)
                .await;
            if results.is_empty() {
                warn!("web search returned no results, continuing with knowledge base only");
            }
            results
        } else {
            Vec::new()
        };

        let used_web_search = !search_results.is_empty();
        let context = compose(&request.query, &passages, &search_results);

        Ok(PreparedQuery {
            passages,
            context,
            used_web_search,
        })
    }

    fn validate(&self, request: &QueryRequest) -> Result<(usize, f64), RagError> {
        if request.query.trim().is_empty() {
            return Err(RagError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let num_results = request
            .num_results
            .unwrap_or(self.settings.default_num_results);
        if !(MIN_NUM_RESULTS..=MAX_NUM_RESULTS).contains(&num_results) {
            return Err(RagError::InvalidRequest(format!(
                "num_results must be between {} and {}, got {}",
                MIN_NUM_RESULTS, MAX_NUM_RESULTS, num_results
            )));
        }

        let threshold = request
            .search_threshold
            .unwrap_or(self.settings.search_threshold);
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(RagError::InvalidRequest(format!(
                "search_threshold must be in [0, 1], got {}",
                threshold
            )));
        }

        Ok((num_results, threshold))
    }
}

/// First 100 characters of a query, for logs.
fn preview(query: &str) -> String {
    query.chars().take(100).collect()
}
