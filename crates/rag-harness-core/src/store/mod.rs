//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the knowledge base seen by the pipeline and
//! the ingestion layer. Backends (SQLite in the app crate, in-memory here)
//! must allow concurrent reads, and must not corrupt state when ingestion
//! and queries interleave; they provide their own concurrency control.
//!
//! Distances returned by [`query`](VectorStore::query) are cosine distances
//! in `[0, 2]`, see [`cosine_distance`](crate::embedding::cosine_distance).

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentChunk, RetrievedPassage, StoreStats};

/// Abstract knowledge-base storage.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`query`](VectorStore::query) | `k` nearest chunks, ascending distance |
/// | [`upsert`](VectorStore::upsert) | insert or replace chunks by `chunk_id` |
/// | [`delete_by_filename`](VectorStore::delete_by_filename) | drop one document's chunks |
/// | [`replace_file`](VectorStore::replace_file) | swap one document's chunks atomically |
/// | [`clear`](VectorStore::clear) | drop everything in the collection |
/// | [`stats`](VectorStore::stats) | chunk and file counts |
/// | [`list_files`](VectorStore::list_files) | indexed filenames, sorted |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection (namespace) this store reads and writes.
    fn collection(&self) -> &str;

    /// Return up to `k` passages ordered by ascending distance. An empty
    /// store yields an empty vector, not an error.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedPassage>>;

    /// Insert or replace `chunks`, paired index-wise with `embeddings`.
    async fn upsert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Remove every chunk of `filename`; returns the number removed.
    async fn delete_by_filename(&self, filename: &str) -> Result<usize>;

    /// Replace every chunk of `filename` with `chunks` as one atomic step.
    /// Readers see either the old version or the new one, never a mix,
    /// and on error the old version is left in place. Returns the number
    /// of chunks removed.
    async fn replace_file(
        &self,
        filename: &str,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize>;

    /// Remove every chunk in the collection.
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Distinct source filenames, sorted ascending.
    async fn list_files(&self) -> Result<Vec<String>>;
}

/// Reject mismatched chunk/embedding batches before touching storage.
pub fn check_batch(chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != embeddings.len() {
        anyhow::bail!(
            "upsert received {} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        );
    }
    Ok(())
}

/// Reject a replacement batch containing chunks of another document.
pub fn check_replacement(
    filename: &str,
    chunks: &[DocumentChunk],
    embeddings: &[Vec<f32>],
) -> Result<()> {
    check_batch(chunks, embeddings)?;
    if let Some(stray) = chunks.iter().find(|c| c.source_filename != filename) {
        anyhow::bail!(
            "chunk {} belongs to {}, not {}",
            stray.chunk_id,
            stray.source_filename,
            filename
        );
    }
    Ok(())
}
