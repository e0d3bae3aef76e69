//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod import;
mod init;
mod permissions;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::import::ImportVariant;

#[derive(Parser)]
#[command(name = "docimport")]
#[command(about = "Bulk document import pipeline")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Import documents described by a delimited file
    Import {
        /// CSV file to import (a private copy is processed)
        file: PathBuf,
        /// User the documents are attributed to
        #[arg(short, long, env = "DOCIMPORT_USER")]
        user: String,
        /// Group references granted read access (comma-separated)
        #[arg(long, value_delimiter = ',')]
        read_groups: Vec<String>,
        /// Group references granted write access (comma-separated)
        #[arg(long, value_delimiter = ',')]
        write_groups: Vec<String>,
        /// Use the standard job: always in-line, large batches
        #[arg(long)]
        standard: bool,
        /// Run the import job in this process instead of enqueuing it
        #[arg(long)]
        sync: bool,
    },

    /// Show the latest progress snapshot for a user (requires a shared redis cache_url)
    Progress {
        #[arg(short, long, env = "DOCIMPORT_USER")]
        user: String,
    },

    /// List recent notifications for a user
    Notifications {
        #[arg(short, long, env = "DOCIMPORT_USER")]
        user: String,
        /// Maximum number of notifications to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Replace read/write groups on existing documents
    Permissions {
        #[arg(short, long, env = "DOCIMPORT_USER")]
        user: String,
        /// Document IDs (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        documents: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        read_groups: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        write_groups: Vec<String>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Import {
            file,
            user,
            read_groups,
            write_groups,
            standard,
            sync,
        } => {
            let variant = if standard {
                ImportVariant::Standard
            } else {
                ImportVariant::Optimized
            };
            import::cmd_import(
                &settings,
                &file,
                &user,
                &read_groups,
                &write_groups,
                variant,
                sync,
            )
            .await
        }
        Commands::Progress { user } => status::cmd_progress(&settings, &user).await,
        Commands::Notifications { user, limit } => {
            status::cmd_notifications(&settings, &user, limit).await
        }
        Commands::Permissions {
            user,
            documents,
            read_groups,
            write_groups,
        } => {
            permissions::cmd_permissions(&settings, &user, documents, &read_groups, &write_groups)
                .await
        }
    }
}
