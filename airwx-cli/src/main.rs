//! Binary crate for the `airwx` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Serving cached weather over HTTP
//! - One-off refreshes and config inspection

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
