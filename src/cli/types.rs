//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "swarmd")]
#[command(about = "Distributed task reservation and dispatch service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server and the background expiration/timeout sweeper
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single sweep pass and exit (for cron-driven deployments)
    Sweep,

    /// Write a default config.yaml and run database migrations
    Init {
        /// Overwrite an existing config.yaml
        #[arg(short, long)]
        force: bool,
    },
}
