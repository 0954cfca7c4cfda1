//! # recordsift CLI
//!
//! ## Usage
//!
//! ```bash
//! recordsift --config ./config/recordsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recordsift init` | Create the SQLite database and run schema migrations |
//! | `recordsift serve` | Start the HTTP API server |
//! | `recordsift search --user <id> "<pattern>"` | Search one user's records |
//! | `recordsift datasets --user <id>` | List one user's datasets |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use recordsift::{config, db, logging, migrate, search, server};

/// recordsift: dataset ingestion, regex search, and question answering
/// over uploaded CSV and PDF files.
#[derive(Parser)]
#[command(name = "recordsift", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recordsift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and runs until Ctrl-C.
    Serve,

    /// Search a user's records with a case-insensitive regular expression.
    Search {
        /// Owner of the records to search.
        #[arg(long)]
        user: i64,
        /// Pattern, used verbatim.
        pattern: String,
    },

    /// List a user's datasets with record counts.
    Datasets {
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Search { user, pattern } => {
            search::run_search(&cfg, user, &pattern).await?;
        }
        Commands::Datasets { user } => {
            search::run_list_datasets(&cfg, user).await?;
        }
    }

    Ok(())
}
