//! TOML configuration.
//!
//! Every tunable of the service lives in one file (default
//! `./config/rag.toml`). Secrets never do: API keys are read from the
//! environment variables named here.
//!
//! ```toml
//! [db]
//! path = "./data/rag.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! collection = "product_knowledge"
//! default_num_results = 5
//! search_threshold = 0.7
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-3.5-turbo"
//!
//! [search]
//! provider = "tavily"
//!
//! [ingest]
//! directory = "./data/pdfs"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use rag_harness_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use rag_harness_core::gate::DEFAULT_SEARCH_THRESHOLD;
use rag_harness_core::pipeline::{PipelineSettings, MAX_NUM_RESULTS, MIN_NUM_RESULTS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_num_results")]
    pub default_num_results: usize,
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            default_num_results: default_num_results(),
            search_threshold: DEFAULT_SEARCH_THRESHOLD,
        }
    }
}

fn default_collection() -> String {
    "product_knowledge".to_string()
}
fn default_num_results() -> usize {
    5
}
fn default_search_threshold() -> f64 {
    DEFAULT_SEARCH_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// API base URL. Defaults to `https://api.openai.com/v1` for `openai`
    /// and `http://localhost:11434` for `ollama`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// OpenAI-compatible API base, without the `/chat/completions` suffix.
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Longest wait for the next streamed fragment before the stream fails.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: default_llm_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_stream_idle_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_url")]
    pub url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout_secs(),
            url: default_search_url(),
        }
    }
}

fn default_search_provider() -> String {
    "tavily".to_string()
}
fn default_max_results() -> usize {
    5
}
fn default_search_timeout_secs() -> u64 {
    15
}
fn default_search_url() -> String {
    "https://api.tavily.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            directory: default_ingest_directory(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_ingest_directory() -> PathBuf {
    PathBuf::from("./data/pdfs")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Name of the environment variable holding the API key. When set,
    /// `/chat/*` and `/knowledge/*` require a matching `X-API-Key` header.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            api_key_env: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            default_num_results: self.retrieval.default_num_results,
            search_threshold: self.retrieval.search_threshold,
            max_search_results: self.search.max_results,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap == 0 {
        bail!("chunking.chunk_overlap must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Retrieval
    if config.retrieval.collection.trim().is_empty() {
        bail!("retrieval.collection must not be empty");
    }
    if !(MIN_NUM_RESULTS..=MAX_NUM_RESULTS).contains(&config.retrieval.default_num_results) {
        bail!(
            "retrieval.default_num_results must be between {} and {}",
            MIN_NUM_RESULTS,
            MAX_NUM_RESULTS
        );
    }
    if !(0.0..=1.0).contains(&config.retrieval.search_threshold) {
        bail!("retrieval.search_threshold must be in [0.0, 1.0]");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // LLM
    match config.llm.provider.as_str() {
        "openai" | "disabled" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be openai or disabled.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Search
    match config.search.provider.as_str() {
        "tavily" | "disabled" => {}
        other => bail!(
            "Unknown search provider: '{}'. Must be tavily or disabled.",
            other
        ),
    }
    if config.search.max_results == 0 {
        bail!("search.max_results must be > 0");
    }

    if config.ingest.include_globs.is_empty() {
        bail!("ingest.include_globs must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/rag.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.collection, "product_knowledge");
        assert_eq!(config.retrieval.default_num_results, 5);
        assert_eq!(config.retrieval.search_threshold, 0.7);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.search.provider, "tavily");
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.server.allowed_origins, vec!["*"]);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ingest.include_globs.len(), 3);
    }

    #[test]
    fn test_pipeline_settings_follow_config() {
        let config = parse_config(
            r#"
            [db]
            path = "rag.sqlite"
            [retrieval]
            default_num_results = 8
            search_threshold = 0.55
            [search]
            max_results = 3
            "#,
        )
        .unwrap();
        let settings = config.pipeline_settings();
        assert_eq!(settings.default_num_results, 8);
        assert_eq!(settings.search_threshold, 0.55);
        assert_eq!(settings.max_search_results, 3);
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_out_of_range_retrieval() {
        assert!(parse_config("[db]\npath = \"x\"\n[retrieval]\ndefault_num_results = 11\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[retrieval]\nsearch_threshold = 1.2\n").is_err());
    }

    #[test]
    fn test_network_embedding_requires_model_and_dims() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));

        let err = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[llm]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[search]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_hash_embedding_needs_no_model() {
        let config =
            parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"hash\"\ndims = 64\n")
                .unwrap();
        assert!(config.embedding.is_enabled());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../config/rag.example.toml")).unwrap();
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dims, Some(1536));
        assert_eq!(config.server.api_key_env, None);
    }
}
