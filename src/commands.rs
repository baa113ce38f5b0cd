//! Implementations of the `rag` subcommands.
//!
//! Each function loads what it needs from the [`Config`], performs one
//! operation and prints a human-readable summary to stdout. Logs go to
//! stderr, so command output stays pipeable.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Result};
use futures_util::StreamExt;

use rag_harness_core::models::Source;
use rag_harness_core::QueryRequest;

use crate::app::AppServices;
use crate::config::Config;
use crate::ingest::DirectoryReport;
use crate::migrate;

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    std::fs::create_dir_all(&config.ingest.directory)?;
    println!("Database initialized successfully.");
    println!("Ingest directory: {}", config.ingest.directory.display());
    Ok(())
}

/// Ingest a single file, a directory, or (with no path) the configured
/// ingest directory.
pub async fn run_ingest(config: &Config, path: Option<&Path>) -> Result<()> {
    let services = AppServices::build(config).await?;
    let ingestor = &services.ingestor;
    let target = path.unwrap_or_else(|| ingestor.directory());

    if target.is_file() {
        let report = ingestor.ingest_file(target).await?;
        println!(
            "Indexed {} ({} chunks, {} total in collection)",
            report.filename, report.chunks_created, report.total_chunks
        );
        return Ok(());
    }

    let report = ingestor.ingest_directory(target).await?;
    print_directory_report(&report);
    if !report.failed.is_empty() && report.files.is_empty() {
        bail!("no files could be ingested from {}", target.display());
    }
    Ok(())
}

pub async fn run_reindex(config: &Config) -> Result<()> {
    let services = AppServices::build(config).await?;
    let report = services.ingestor.reindex().await?;
    print_directory_report(&report);
    Ok(())
}

fn print_directory_report(report: &DirectoryReport) {
    if report.files.is_empty() && report.failed.is_empty() {
        println!("No documents found.");
        return;
    }
    for file in &report.files {
        println!("  {} ({} chunks)", file.filename, file.chunks_created);
    }
    for (name, err) in &report.failed {
        println!("  FAILED {}: {}", name, err);
    }
    println!(
        "Indexed {} files, {} chunks ({} failed).",
        report.files.len(),
        report.chunks_created(),
        report.failed.len()
    );
}

pub async fn run_query(config: &Config, request: QueryRequest, stream: bool) -> Result<()> {
    let services = AppServices::build(config).await?;

    if stream {
        let mut fragments = services.pipeline.query_stream(&request).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.next().await {
            write!(stdout, "{}", fragment?)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        return Ok(());
    }

    let response = services.pipeline.query(&request).await?;
    println!("{}", response.answer);
    println!();
    println!(
        "confidence: {:.2}    web search: {}",
        response.confidence,
        if response.used_web_search { "yes" } else { "no" }
    );

    if response.sources.is_empty() {
        return Ok(());
    }
    println!("sources:");
    for (i, source) in response.sources.iter().enumerate() {
        match source {
            Source::KnowledgeBase {
                filename,
                page_number,
                chunk_number,
                relevance_score,
            } => {
                let page = page_number
                    .map(|p| format!(", page {}", p))
                    .unwrap_or_default();
                println!(
                    "  {}. [{:.2}] {}{} (chunk {})",
                    i + 1,
                    relevance_score,
                    filename,
                    page,
                    chunk_number
                );
            }
            Source::WebSearch {
                title,
                url,
                relevance_score,
            } => {
                println!("  {}. [{:.2}] {}", i + 1, relevance_score, title);
                println!("      {}", url);
            }
        }
    }
    Ok(())
}

pub async fn run_documents(config: &Config) -> Result<()> {
    let services = AppServices::build(config).await?;
    let files = services.pipeline.store().list_files().await?;
    if files.is_empty() {
        println!("No documents indexed.");
        return Ok(());
    }
    for file in &files {
        println!("{}", file);
    }
    println!("{} documents", files.len());
    Ok(())
}

pub async fn run_delete(config: &Config, filename: &str) -> Result<()> {
    let services = AppServices::build(config).await?;
    let report = services.ingestor.delete_document(filename).await?;
    if !report.found() {
        bail!("document not found: {}", filename);
    }
    println!(
        "Deleted {} ({} chunks{})",
        filename,
        report.chunks_removed,
        if report.file_removed {
            ", stored file removed"
        } else {
            ""
        }
    );
    Ok(())
}

pub async fn run_clear(config: &Config) -> Result<()> {
    let services = AppServices::build(config).await?;
    services.pipeline.store().clear().await?;
    println!(
        "Cleared collection {}.",
        services.pipeline.store().collection()
    );
    Ok(())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let services = AppServices::build(config).await?;
    let stats = services.pipeline.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
