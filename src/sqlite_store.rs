//! SQLite-backed [`VectorStore`].
//!
//! Each chunk is one row of the `chunks` table keyed by
//! `(collection, chunk_id)`, with the embedding stored as a little-endian
//! f32 BLOB. Similarity queries are brute force: every row of the
//! collection with a matching dimensionality is decoded and scored with
//! [`cosine_distance`]. That keeps distances on the `[0, 2]` scale the
//! confidence mapping expects, and is fast enough for product
//! documentation sized corpora.
//!
//! Concurrency comes from SQLite itself: the pool opens the file in WAL
//! mode and `upsert` writes inside a transaction, so readers never observe
//! a half-written batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};

use rag_harness_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use rag_harness_core::models::{DocumentChunk, RetrievedPassage, StoreStats};
use rag_harness_core::store::{check_batch, check_replacement, VectorStore};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorStore {
    /// Wrap an open pool. The schema must already exist.
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Connect using `[db]`, create the schema if needed, and bind to
    /// `[retrieval] collection`.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool, config.retrieval.collection.clone()))
    }

    /// Number of stored chunks belonging to `filename`.
    pub async fn count_for_file(&self, filename: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks WHERE collection = ? AND source_filename = ?",
        )
        .bind(&self.collection)
        .bind(filename)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, content, source_filename, page_number, chunk_index, \
                    start_offset, end_offset, embedding \
             FROM chunks WHERE collection = ? AND dims = ?",
        )
        .bind(&self.collection)
        .bind(embedding.len() as i64)
        .fetch_all(&self.pool)
        .await
        .context("vector query failed")?;

        let mut passages = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let page_number: Option<i64> = row.get("page_number");
            let chunk_index: i64 = row.get("chunk_index");
            let start_offset: i64 = row.get("start_offset");
            let end_offset: i64 = row.get("end_offset");

            passages.push(RetrievedPassage {
                chunk: DocumentChunk {
                    chunk_id: row.get("chunk_id"),
                    content: row.get("content"),
                    source_filename: row.get("source_filename"),
                    page_number: page_number.map(|p| p as u32),
                    chunk_index: chunk_index as usize,
                    start_offset: start_offset as usize,
                    end_offset: end_offset as usize,
                },
                distance: cosine_distance(embedding, &vector),
            });
        }

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
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
            insert_chunk(&mut tx, &self.collection, chunk, vector).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE collection = ? AND source_filename = ?")
            .bind(&self.collection)
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn replace_file(
        &self,
        filename: &str,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        check_replacement(filename, chunks, embeddings)?;

        let mut tx = self.pool.begin().await?;
        let removed =
            sqlx::query("DELETE FROM chunks WHERE collection = ? AND source_filename = ?")
                .bind(&self.collection)
                .bind(filename)
                .execute(&mut *tx)
                .await?
                .rows_affected() as usize;
        for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
            insert_chunk(&mut tx, &self.collection, chunk, vector).await?;
        }
        tx.commit()
            .await
            .with_context(|| format!("failed to commit chunks of {}", filename))?;
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT source_filename) AS files \
             FROM chunks WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        let files: i64 = row.get("files");
        Ok(StoreStats {
            total_chunks: total as usize,
            unique_files: files as usize,
        })
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let files: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT source_filename FROM chunks WHERE collection = ? \
             ORDER BY source_filename",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }
}

/// Insert or overwrite one chunk row inside an open transaction.
async fn insert_chunk(
    conn: &mut SqliteConnection,
    collection: &str,
    chunk: &DocumentChunk,
    vector: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunks (collection, chunk_id, content, source_filename, page_number,
                            chunk_index, start_offset, end_offset, embedding, dims)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(collection, chunk_id) DO UPDATE SET
            content = excluded.content,
            source_filename = excluded.source_filename,
            page_number = excluded.page_number,
            chunk_index = excluded.chunk_index,
            start_offset = excluded.start_offset,
            end_offset = excluded.end_offset,
            embedding = excluded.embedding,
            dims = excluded.dims
        "#,
    )
    .bind(collection)
    .bind(&chunk.chunk_id)
    .bind(&chunk.content)
    .bind(&chunk.source_filename)
    .bind(chunk.page_number.map(|p| p as i64))
    .bind(chunk.chunk_index as i64)
    .bind(chunk.start_offset as i64)
    .bind(chunk.end_offset as i64)
    .bind(vec_to_blob(vector))
    .bind(vector.len() as i64)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("failed to store chunk {}", chunk.chunk_id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store(collection: &str) -> SqliteVectorStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteVectorStore::new(pool, collection)
    }

    fn chunk(filename: &str, index: usize, page: Option<u32>) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("{}_{}", filename, index),
            content: format!("{} part {}", filename, index),
            source_filename: filename.to_string(),
            page_number: page,
            chunk_index: index,
            start_offset: index * 800,
            end_offset: index * 800 + 1000,
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_cosine_distance() {
        let store = memory_store("kb").await;
        store
            .upsert(
                &[chunk("a.pdf", 0, Some(1)), chunk("b.pdf", 0, None), chunk("c.pdf", 0, Some(3))],
                &[vec![0.0, 1.0], vec![1.0, 0.0], vec![-1.0, 0.0]],
            )
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source_filename, "b.pdf");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[0].chunk.page_number, None);
        assert_eq!(hits[1].chunk.source_filename, "a.pdf");
        assert!((hits[1].distance - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].chunk.page_number, Some(1));
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = memory_store("kb").await;
        assert!(store.query(&[1.0, 0.0], 5).await.unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_chunk_id() {
        let store = memory_store("kb").await;
        store
            .upsert(&[chunk("a.pdf", 0, None)], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        let mut updated = chunk("a.pdf", 0, None);
        updated.content = "rewritten".to_string();
        store.upsert(&[updated], &[vec![0.0, 1.0]]).await.unwrap();

        assert_eq!(store.stats().await.unwrap().total_chunks, 1);
        let hits = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].chunk.content, "rewritten");
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        let first = SqliteVectorStore::new(pool.clone(), "first");
        let second = SqliteVectorStore::new(pool, "second");

        first
            .upsert(&[chunk("a.pdf", 0, None)], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        assert_eq!(first.stats().await.unwrap().total_chunks, 1);
        assert_eq!(second.stats().await.unwrap().total_chunks, 0);
        second.clear().await.unwrap();
        assert_eq!(first.stats().await.unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn test_delete_list_and_stats() {
        let store = memory_store("kb").await;
        store
            .upsert(
                &[chunk("b.pdf", 0, None), chunk("b.pdf", 1, None), chunk("a.txt", 0, None)],
                &[vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();

        assert_eq!(store.list_files().await.unwrap(), vec!["a.txt", "b.pdf"]);
        assert_eq!(
            store.stats().await.unwrap(),
            StoreStats {
                total_chunks: 3,
                unique_files: 2
            }
        );
        assert_eq!(store.count_for_file("b.pdf").await.unwrap(), 2);

        assert_eq!(store.delete_by_filename("b.pdf").await.unwrap(), 2);
        assert_eq!(store.delete_by_filename("missing.pdf").await.unwrap(), 0);
        assert_eq!(store.list_files().await.unwrap(), vec!["a.txt"]);

        store.clear().await.unwrap();
        assert!(store.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_mismatched_batch() {
        let store = memory_store("kb").await;
        let err = store
            .upsert(&[chunk("a.pdf", 0, None)], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 chunks but 0 embeddings"));
    }

    #[tokio::test]
    async fn test_replace_file_is_all_or_nothing() {
        let store = memory_store("kb").await;
        store
            .upsert(
                &[chunk("b.pdf", 0, None), chunk("b.pdf", 1, None), chunk("a.txt", 0, None)],
                &[vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();

        let removed = store
            .replace_file("b.pdf", &[chunk("b.pdf", 0, Some(2))], &[vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count_for_file("b.pdf").await.unwrap(), 1);
        assert_eq!(store.count_for_file("a.txt").await.unwrap(), 1);

        let err = store
            .replace_file("b.pdf", &[chunk("a.txt", 3, None)], &[vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("belongs to a.txt"));
        assert_eq!(store.count_for_file("b.pdf").await.unwrap(), 1);
    }
}
