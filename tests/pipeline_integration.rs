//! End-to-end pipeline tests over the SQLite store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tempfile::TempDir;

use rag_harness::config::{parse_config, Config};
use rag_harness::ingest::Ingestor;
use rag_harness::sqlite_store::SqliteVectorStore;
use rag_harness_core::compose::NO_KB_CONTEXT;
use rag_harness_core::embedding::HashEmbeddingProvider;
use rag_harness_core::generation::{Generator, TextStream};
use rag_harness_core::models::{ChatMessage, SearchResult, Source};
use rag_harness_core::store::VectorStore;
use rag_harness_core::web_search::WebSearch;
use rag_harness_core::{QueryRequest, RagPipeline};

#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn record(&self, messages: &[ChatMessage]) {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        self.prompts.lock().unwrap().push(prompt);
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.record(messages);
        Ok("answer".to_string())
    }

    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        self.record(messages);
        Ok(Box::pin(stream::iter(vec![
            Ok("ans".to_string()),
            Ok("wer".to_string()),
        ])))
    }
}

struct FixedSearch {
    calls: AtomicUsize,
    results: Vec<SearchResult>,
}

impl FixedSearch {
    fn new(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            results: (0..n)
                .map(|i| SearchResult {
                    title: format!("Result {}", i),
                    url: format!("https://example.com/{}", i),
                    content: format!("Web content {}", i),
                    relevance_score: 0.9 - i as f64 * 0.1,
                })
                .collect(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for FixedSearch {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    async fn search(&self, _query: &str, max_results: usize) -> Vec<SearchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results.iter().take(max_results).cloned().collect()
    }
}

struct Harness {
    _tmp: TempDir,
    config: Config,
    store: Arc<SqliteVectorStore>,
    generator: Arc<RecordingGenerator>,
    search: Arc<FixedSearch>,
    pipeline: RagPipeline,
}

async fn harness(search_results: usize) -> Harness {
    let tmp = TempDir::new().unwrap();
    let config = parse_config(&format!(
        "[db]\npath = {:?}\n[chunking]\nchunk_size = 300\nchunk_overlap = 50\n\
         [ingest]\ndirectory = {:?}\n",
        tmp.path().join("rag.sqlite").display().to_string(),
        tmp.path().join("docs").display().to_string()
    ))
    .unwrap();

    let store = Arc::new(SqliteVectorStore::open(&config).await.unwrap());
    let generator = Arc::new(RecordingGenerator::default());
    let search = Arc::new(FixedSearch::new(search_results));
    let pipeline = RagPipeline::new(
        store.clone(),
        Arc::new(HashEmbeddingProvider::new(128)),
        generator.clone(),
        search.clone(),
        config.pipeline_settings(),
    );

    Harness {
        _tmp: tmp,
        config,
        store,
        generator,
        search,
        pipeline,
    }
}

impl Harness {
    fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            &self.config,
            self.store.clone(),
            Arc::new(HashEmbeddingProvider::new(128)),
        )
        .unwrap()
    }
}

#[tokio::test]
async fn test_empty_knowledge_base_falls_back_to_web() {
    let h = harness(2).await;

    let response = h
        .pipeline
        .query(&QueryRequest::new("How do I export reports?"))
        .await
        .unwrap();

    assert!(response.used_web_search);
    assert_eq!(response.confidence, 0.0);
    assert_eq!(response.sources.len(), 2);
    assert!(response.sources.iter().all(|s| !s.is_knowledge_base()));
    assert_eq!(h.search.calls(), 1);

    let prompt = h.generator.last_prompt();
    assert!(prompt.contains(NO_KB_CONTEXT));
    assert!(prompt.contains("Web content 0"));
    assert!(prompt.contains("How do I export reports?"));
}

#[tokio::test]
async fn test_exact_match_skips_web_search() {
    let h = harness(2).await;
    let text = "Reports can be exported as CSV from the Analytics tab.";
    h.ingestor()
        .ingest_upload("reports.txt", text.as_bytes())
        .await
        .unwrap();

    let response = h.pipeline.query(&QueryRequest::new(text)).await.unwrap();

    assert!(!response.used_web_search);
    assert_eq!(h.search.calls(), 0);
    assert_eq!(response.confidence, 1.0);
    assert_eq!(
        response.sources,
        vec![Source::KnowledgeBase {
            filename: "reports.txt".to_string(),
            page_number: None,
            chunk_number: 0,
            relevance_score: 1.0,
        }]
    );
    assert!(h.generator.last_prompt().contains("Analytics tab"));
}

#[tokio::test]
async fn test_unrelated_query_adds_web_context() {
    let h = harness(4).await;
    h.ingestor()
        .ingest_upload("billing.md", b"Invoices are issued on the first of the month.")
        .await
        .unwrap();

    let response = h
        .pipeline
        .query(&QueryRequest::new("kubernetes ingress controller"))
        .await
        .unwrap();

    // No shared vocabulary: confidence stays near 0.5, below the 0.7 default.
    assert!(response.confidence < 0.7);
    assert!(response.used_web_search);
    let kb: Vec<&Source> = response
        .sources
        .iter()
        .filter(|s| s.is_knowledge_base())
        .collect();
    assert_eq!(kb.len(), 1);
    assert!(response.sources[0].is_knowledge_base());
    // Default search.max_results is 5, but only 3 web sources are attributed.
    assert_eq!(response.sources.len(), 4);

    let prompt = h.generator.last_prompt();
    let kb_at = prompt.find("Invoices are issued").unwrap();
    let web_at = prompt.find("Web content 0").unwrap();
    assert!(kb_at < web_at);
}

#[tokio::test]
async fn test_opt_out_and_threshold_override() {
    let h = harness(2).await;
    h.ingestor()
        .ingest_upload("billing.md", b"Invoices are issued on the first of the month.")
        .await
        .unwrap();

    let response = h
        .pipeline
        .query(&QueryRequest::new("kubernetes ingress").use_search(false))
        .await
        .unwrap();
    assert!(!response.used_web_search);
    assert_eq!(h.search.calls(), 0);

    // A zero threshold trusts any non-empty retrieval.
    let response = h
        .pipeline
        .query(&QueryRequest::new("kubernetes ingress").search_threshold(0.0))
        .await
        .unwrap();
    assert!(!response.used_web_search);
    assert_eq!(h.search.calls(), 0);
}

#[tokio::test]
async fn test_stream_uses_same_context() {
    let h = harness(1).await;
    h.ingestor()
        .ingest_upload("faq.txt", b"Two-factor codes expire after thirty seconds.")
        .await
        .unwrap();

    let request = QueryRequest::new("two-factor codes").use_search(false);
    h.pipeline.query(&request).await.unwrap();
    let full_prompt = h.generator.last_prompt();

    let fragments: Vec<String> = h
        .pipeline
        .query_stream(&request)
        .await
        .unwrap()
        .map(|f| f.unwrap())
        .collect()
        .await;
    assert_eq!(fragments.concat(), "answer");
    assert_eq!(h.generator.last_prompt(), full_prompt);
}

#[tokio::test]
async fn test_reingest_and_delete_reflect_in_retrieval() {
    let h = harness(0).await;
    let ingestor = h.ingestor();
    let long = "Single sign-on is configured under Security. ".repeat(30);
    ingestor
        .ingest_upload("sso.md", long.as_bytes())
        .await
        .unwrap();
    let before = h.store.count_for_file("sso.md").await.unwrap();
    assert!(before > 1);

    ingestor
        .ingest_upload("sso.md", b"Single sign-on moved to Identity.")
        .await
        .unwrap();
    assert_eq!(h.store.count_for_file("sso.md").await.unwrap(), 1);

    ingestor.delete_document("sso.md").await.unwrap();
    let stats = h.pipeline.stats().await.unwrap();
    assert_eq!(stats.vector_store.total_chunks, 0);
    assert_eq!(stats.vector_store.embedding_dimension, 128);
    assert_eq!(stats.search_provider, "fixed");
    assert!(h.store.list_files().await.unwrap().is_empty());
}
