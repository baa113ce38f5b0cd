//! In-memory [`VectorStore`] implementation for tests and embedded use.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every stored vector.

use std::collections::BTreeSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{DocumentChunk, RetrievedPassage, StoreStats};

use super::{check_batch, check_replacement, VectorStore};

struct StoredChunk {
    chunk: DocumentChunk,
    vector: Vec<f32>,
}

/// In-memory store.
pub struct InMemoryStore {
    collection: String,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("default")
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut passages: Vec<RetrievedPassage> = stored
            .iter()
            .map(|sc| RetrievedPassage {
                chunk: sc.chunk.clone(),
                distance: cosine_distance(embedding, &sc.vector),
            })
            .collect();
        passages.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        passages.truncate(k);
        Ok(passages)
    }

    async fn upsert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        check_batch(chunks, embeddings)?;
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
            stored.retain(|sc| sc.chunk.chunk_id != chunk.chunk_id);
            stored.push(StoredChunk {
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|sc| sc.chunk.source_filename != filename);
        Ok(before - stored.len())
    }

    async fn replace_file(
        &self,
        filename: &str,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        check_replacement(filename, chunks, embeddings)?;
        let mut stored = self.chunks.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|sc| sc.chunk.source_filename != filename);
        let removed = before - stored.len();
        for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
            stored.push(StoredChunk {
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.chunks.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let files: BTreeSet<&str> = stored
            .iter()
            .map(|sc| sc.chunk.source_filename.as_str())
            .collect();
        Ok(StoreStats {
            total_chunks: stored.len(),
            unique_files: files.len(),
        })
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let files: BTreeSet<String> = stored
            .iter()
            .map(|sc| sc.chunk.source_filename.clone())
            .collect();
        Ok(files.into_iter().collect())
    }
}
