//! Wiring of configured collaborators into a pipeline and an ingestor.
//!
//! The CLI and the HTTP server both start from [`AppServices::build`], so a
//! query answered over HTTP and one answered on the command line see the
//! same store, embedder, generator and search provider.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use rag_harness_core::embedding::EmbeddingProvider;
use rag_harness_core::generation::Generator;
use rag_harness_core::store::VectorStore;
use rag_harness_core::web_search::WebSearch;
use rag_harness_core::RagPipeline;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::Ingestor;
use crate::llm::create_generator;
use crate::sqlite_store::SqliteVectorStore;
use crate::web_search::create_search;

#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<Config>,
    pub pipeline: RagPipeline,
    pub ingestor: Ingestor,
}

impl AppServices {
    /// Open the knowledge base and construct every collaborator named in
    /// `config`.
    pub async fn build(config: &Config) -> Result<Self> {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open(config).await?);
        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.llm)?;
        let search = create_search(&config.search)?;

        info!(
            collection = %store.collection(),
            embedding = %embedder.model_name(),
            llm = %generator.model_name(),
            search = %search.provider_name(),
            "services ready"
        );

        Self::from_parts(config, store, embedder, generator, search)
    }

    /// Assemble services from explicit collaborators.
    pub fn from_parts(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        search: Arc<dyn WebSearch>,
    ) -> Result<Self> {
        let ingestor = Ingestor::new(config, store.clone(), embedder.clone())?;
        let pipeline = RagPipeline::new(
            store,
            embedder,
            generator,
            search,
            config.pipeline_settings(),
        );
        Ok(Self {
            config: Arc::new(config.clone()),
            pipeline,
            ingestor,
        })
    }
}
