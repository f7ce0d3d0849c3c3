use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fetch URLs at most once and keep their bytes in a local store.
#[derive(Debug, Parser)]
#[command(name = "fetchonce", version, about)]
pub struct Cli {
    /// TOML config file; takes the place of FETCHONCE_CONFIG_FILE
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve URLs from the store, fetching the ones that are missing
    Get {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Write each payload into this directory
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Fetch URLs again and replace what is stored
    Refresh {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Write each payload into this directory
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// List stored entries
    List,
}
