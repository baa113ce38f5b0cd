//! Knowledge-base ingestion.
//!
//! Flow for one file:
//!
//! ```text
//! extract → chunk → drop blank chunks → embed → replace the file's chunks
//! ```
//!
//! A document is identified by its file name. Re-ingesting a file swaps
//! every chunk it previously contributed in one store operation, so a
//! shorter new version leaves no stale tail behind and a failed one leaves
//! the old version searchable. Writes to the same document are serialized.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};
use walkdir::WalkDir;

use rag_harness_core::chunk::Chunker;
use rag_harness_core::embedding::EmbeddingProvider;
use rag_harness_core::models::DocumentChunk;
use rag_harness_core::store::VectorStore;

use crate::config::Config;
use crate::extract::{self, supported_extension, ExtractedDocument};

/// Outcome of ingesting one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub filename: String,
    pub chunks_created: usize,
    /// Chunks in the whole collection after this file was stored.
    pub total_chunks: usize,
}

/// Outcome of ingesting a directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryReport {
    pub files: Vec<IngestReport>,
    /// `(filename, error)` for every file that could not be ingested.
    pub failed: Vec<(String, String)>,
}

impl DirectoryReport {
    pub fn chunks_created(&self) -> usize {
        self.files.iter().map(|f| f.chunks_created).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub chunks_removed: usize,
    pub file_removed: bool,
}

impl DeleteReport {
    /// `false` when neither chunks nor a stored file existed.
    pub fn found(&self) -> bool {
        self.chunks_removed > 0 || self.file_removed
    }
}

type DocumentLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    batch_size: usize,
    directory: PathBuf,
    include: GlobSet,
    locks: DocumentLocks,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            embedder,
            chunker: Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?,
            batch_size: config.embedding.batch_size.max(1),
            directory: config.ingest.directory.clone(),
            include: build_globset(&config.ingest.include_globs)?,
            locks: DocumentLocks::default(),
        })
    }

    /// Directory uploads are stored in and `reindex` reads from.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Extract, chunk, embed and store one file, replacing any earlier
    /// version of it.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("not a file path: {}", path.display()))?;
        let _guard = self.lock_document(&filename).await?;

        let owned = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || extract::extract_file(&owned))
            .await?
            .with_context(|| format!("failed to extract {}", path.display()))?;
        self.index(document).await
    }

    /// Ingest every matching file under `dir`. A file that fails is logged
    /// and recorded; the rest still load. A missing directory is created.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<DirectoryReport> {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
            warn!(directory = %dir.display(), "ingest directory did not exist; created it");
            return Ok(DirectoryReport::default());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            if self.include.is_match(relative) {
                paths.push(path.to_path_buf());
            }
        }
        // Sort for deterministic ordering
        paths.sort();

        info!(directory = %dir.display(), files = paths.len(), "ingesting directory");

        let mut report = DirectoryReport::default();
        for path in paths {
            match self.ingest_file(&path).await {
                Ok(file_report) => report.files.push(file_report),
                Err(e) => {
                    let name = path.display().to_string();
                    warn!(file = %name, error = %format!("{:#}", e), "failed to ingest file");
                    report.failed.push((name, format!("{:#}", e)));
                }
            }
        }

        info!(
            files = report.files.len(),
            failed = report.failed.len(),
            chunks = report.chunks_created(),
            "directory ingestion complete"
        );
        Ok(report)
    }

    /// Clear the collection and rebuild it from the ingest directory.
    pub async fn reindex(&self) -> Result<DirectoryReport> {
        info!("clearing collection for reindex");
        self.store.clear().await?;
        self.ingest_directory(&self.directory).await
    }

    /// Index uploaded content and store it in the ingest directory.
    ///
    /// Only the final path component of `filename` is used, so an upload
    /// can never write outside the directory. The bytes go to a hidden
    /// staging file first and replace the stored file only once indexing
    /// succeeded; a failed upload leaves an earlier version untouched.
    pub async fn ingest_upload(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        let name = sanitize_filename(filename)?;
        let _guard = self.lock_document(&name).await?;

        let content = bytes.to_vec();
        let extract_name = name.clone();
        let document =
            tokio::task::spawn_blocking(move || extract::extract_bytes(&extract_name, content))
                .await?
                .with_context(|| format!("failed to extract {}", name))?;

        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("failed to create {}", self.directory.display()))?;
        let path = self.directory.join(&name);
        let staging = self.directory.join(format!(".{}.partial", name));
        tokio::fs::write(&staging, bytes)
            .await
            .with_context(|| format!("failed to save {}", staging.display()))?;

        let report = match self.index(document).await {
            Ok(report) => report,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("failed to save {}", path.display()))?;
        info!(filename = %name, bytes = bytes.len(), "upload saved");
        Ok(report)
    }

    /// Remove a document's chunks and its stored file, if any.
    ///
    /// `filename` must be a bare document name as listed by the store;
    /// anything carrying a path is rejected before either is touched.
    pub async fn delete_document(&self, filename: &str) -> Result<DeleteReport> {
        check_document_name(filename)?;
        let _guard = self.lock_document(filename).await?;

        let chunks_removed = self.store.delete_by_filename(filename).await?;
        let path = self.directory.join(filename);
        let mut file_removed = false;
        if tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to remove {}", path.display()))?;
            file_removed = true;
        }
        info!(filename = %filename, chunks_removed, file_removed, "document deleted");
        Ok(DeleteReport {
            chunks_removed,
            file_removed,
        })
    }

    /// Chunk, embed and store an extracted document. Every embedding is
    /// computed before the store is touched.
    async fn index(&self, document: ExtractedDocument) -> Result<IngestReport> {
        let filename = document.metadata.filename.clone();
        let chunks: Vec<DocumentChunk> = self
            .chunker
            .chunk(&document.text, &document.metadata)
            .into_iter()
            .filter(|chunk| {
                let keep = !chunk.content.is_empty();
                if !keep {
                    warn!(chunk_id = %chunk.chunk_id, "skipping whitespace-only chunk");
                }
                keep
            })
            .collect();

        if chunks.is_empty() {
            warn!(filename = %filename, "no text extracted");
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .with_context(|| format!("failed to embed chunks of {}", filename))?;
            embeddings.extend(vectors);
        }

        let removed = self
            .store
            .replace_file(&filename, &chunks, &embeddings)
            .await?;
        if removed > 0 {
            info!(filename = %filename, removed, "replaced previously indexed chunks");
        }

        let total_chunks = self.store.stats().await?.total_chunks;
        info!(
            filename = %filename,
            chunks = chunks.len(),
            pages = ?document.num_pages,
            total_chunks,
            "document ingested"
        );

        Ok(IngestReport {
            filename,
            chunks_created: chunks.len(),
            total_chunks,
        })
    }

    /// Hold the write lock of one document.
    async fn lock_document(&self, filename: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .lock()
            .map_err(|_| anyhow::anyhow!("document lock table poisoned"))?
            .entry(filename.to_string())
            .or_default()
            .clone();
        Ok(lock.lock_owned().await)
    }
}

/// Fail unless `filename` is already a bare, supported document name.
pub fn check_document_name(filename: &str) -> Result<()> {
    match sanitize_filename(filename) {
        Ok(name) if name == filename => Ok(()),
        _ => bail!(
            "invalid document name: {:?} (expected a bare file name such as guide.pdf)",
            filename
        ),
    }
}

/// Reduce an uploaded name to a safe, supported file name.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        bail!("invalid file name: {:?}", filename);
    }
    if supported_extension(name).is_none() {
        bail!(
            "unsupported file type: {} (allowed: {})",
            name,
            extract::SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| format!(".{}", e))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(name.to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
