use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an already open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per indexed chunk. Collections namespace the table so several
    // knowledge bases can share a file.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            collection TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            content TEXT NOT NULL,
            source_filename TEXT NOT NULL,
            page_number INTEGER,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            PRIMARY KEY (collection, chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_filename ON chunks(collection, source_filename)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
