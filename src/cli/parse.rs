//! CLI parse: clap types for metapush. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Metapush CLI - mirror a directory tree onto the ledger
#[derive(Parser)]
#[command(name = "metapush")]
#[command(about = "Push a directory tree to the ledger as metanet transactions and clone it back")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push the workspace tree to the ledger
    Push {
        /// Skip the fee confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Clone a pushed tree by transaction id
    Clone {
        /// Transaction id of the tree root (or of a single node)
        tx_id: String,

        /// Directory to clone into
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Push { .. } => "push",
            Commands::Clone { .. } => "clone",
        }
    }
}
