//! CLI interface for schoolgate

pub mod commands;
mod output;

pub use output::*;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "schoolgate")]
#[command(version)]
#[command(about = "Authentication service for school management", long_about = None)]
pub struct Cli {
    /// Path to schoolgate.toml (searched upward from the current directory by default)
    #[arg(short, long, global = true, env = "SCHOOLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter schoolgate.toml with freshly generated secrets
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a bcrypt hash for a [[users]] entry
    HashPassword {
        /// Password to hash; prompted for when omitted
        password: Option<String>,

        /// bcrypt work factor
        #[arg(long, default_value = "12")]
        cost: u32,
    },

    /// List the configured user accounts
    Users {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}
