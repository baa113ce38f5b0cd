//! # RAG Harness CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and the ingest directory |
//! | `rag ingest [PATH]` | Index a file or directory (default: ingest directory) |
//! | `rag query "<question>"` | Answer a question from the knowledge base |
//! | `rag documents` | List indexed documents |
//! | `rag delete <FILENAME>` | Remove a document |
//! | `rag clear` | Remove every indexed chunk |
//! | `rag reindex` | Clear and re-index the ingest directory |
//! | `rag stats` | Print pipeline statistics as JSON |
//! | `rag serve` | Start the HTTP server |
//! | `rag completions <SHELL>` | Print shell completions |

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use rag_harness::{commands, config, logging, server};
use rag_harness_core::QueryRequest;

/// RAG Harness: a knowledge-base question answering service with
/// confidence-gated web search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "RAG Harness: knowledge-base question answering with confidence-gated web search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it again leaves existing data untouched.
    Init,

    /// Index documents (.pdf, .txt, .md).
    ///
    /// Re-ingesting a file replaces all of its previous chunks.
    Ingest {
        /// File or directory to ingest. Defaults to `[ingest] directory`.
        path: Option<PathBuf>,
    },

    /// Ask a question.
    Query {
        /// The question.
        query: String,

        /// Never fall back to web search.
        #[arg(long)]
        no_search: bool,

        /// Passages to retrieve (1-10). Defaults to `[retrieval] default_num_results`.
        #[arg(long)]
        num_results: Option<usize>,

        /// Confidence below which web search runs (0.0-1.0).
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,
    },

    /// List indexed documents.
    Documents,

    /// Remove a document's chunks and its stored file.
    Delete {
        /// File name as shown by `rag documents`.
        filename: String,
    },

    /// Remove every chunk in the collection.
    Clear,

    /// Clear the collection and re-index the ingest directory.
    Reindex,

    /// Print collection and model statistics.
    Stats,

    /// Start the HTTP server on `[server] bind`.
    Serve,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "rag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Ingest { path } => commands::run_ingest(&cfg, path.as_deref()).await?,
        Commands::Query {
            query,
            no_search,
            num_results,
            threshold,
            stream,
        } => {
            let request = QueryRequest {
                query,
                use_search: !no_search,
                num_results,
                search_threshold: threshold,
            };
            commands::run_query(&cfg, request, stream).await?;
        }
        Commands::Documents => commands::run_documents(&cfg).await?,
        Commands::Delete { filename } => commands::run_delete(&cfg, &filename).await?,
        Commands::Clear => commands::run_clear(&cfg).await?,
        Commands::Reindex => commands::run_reindex(&cfg).await?,
        Commands::Stats => commands::run_stats(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
        // Handled above (before config loading)
        Commands::Completions { .. } => {}
    }

    Ok(())
}
