//! # ragbase CLI
//!
//! Serves the HTTP API and exposes the core knowledge-base operations for
//! scripting.
//!
//! ```bash
//! ragbase serve                                   # start the HTTP API
//! ragbase list                                    # list knowledge bases
//! ragbase create docs
//! ragbase ingest-repo docs https://github.com/org/repo.git --branch main
//! ragbase query docs "how do I configure the scheduler?"
//! ragbase delete docs
//! ```
//!
//! All commands accept `--config` pointing to a TOML file; missing files
//! fall back to built-in defaults so a local Ollama works out of the box.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragbase::config::{load_config, Config};
use ragbase::ingest::{self, KbLocks};
use ragbase::kb::KnowledgeBaseStore;
use ragbase::rag;
use ragbase::repo::CloneRequest;
use ragbase::server;

#[derive(Parser)]
#[command(
    name = "ragbase",
    about = "Build knowledge bases from files and repositories, then ask questions against them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragbase.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// List knowledge base names.
    List,

    /// Create a knowledge base (idempotent).
    Create { name: String },

    /// Delete a knowledge base and its index.
    Delete { name: String },

    /// Clone a repository into a knowledge base and index its files.
    IngestRepo {
        name: String,
        url: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },

    /// Ask a question against a knowledge base.
    Query {
        name: String,
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "config file not found, using defaults");
        Config::default()
    };

    match cli.command {
        Commands::Serve => server::run_server(&config).await?,

        Commands::List => {
            let store = KnowledgeBaseStore::new(&config);
            for name in store.list()? {
                println!("{}", name);
            }
        }

        Commands::Create { name } => {
            let store = KnowledgeBaseStore::new(&config);
            store.ensure(&name)?;
            println!("created {}", name);
        }

        Commands::Delete { name } => {
            let store = KnowledgeBaseStore::new(&config);
            if store.delete(&name) {
                println!("deleted {}", name);
            } else {
                anyhow::bail!("failed to delete knowledge base '{}'", name);
            }
        }

        Commands::IngestRepo {
            name,
            url,
            branch,
            username,
            token,
        } => {
            let locks = KbLocks::new();
            let req = CloneRequest {
                url,
                branch,
                username,
                token,
            };
            let chunks = ingest::ingest_repository(&config, &locks, &name, &req).await?;
            println!("indexed {} chunks into {}", chunks, name);
        }

        Commands::Query {
            name,
            question,
            top_k,
        } => {
            let store = KnowledgeBaseStore::new(&config);
            let top_k = top_k.unwrap_or(config.retrieval.top_k).max(1);
            let answer = rag::answer(&config, &store.vector_dir(&name), &question, top_k).await?;
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!("\nsources:");
                for source in &answer.sources {
                    println!("  {}", source.source);
                }
            }
        }
    }

    Ok(())
}
