//! standoff CLI - assemble stand-off annotation corpora.
//!
//! Usage:
//!   standoff assemble                      # Whole corpus, one JSON summary
//!   standoff stats <DOC>                   # Element counts of one document
//!   standoff resolve <DOC> <FILE#ID>       # Look up one element
//!   standoff layer <DOC> <NAME>            # Members of a layer
//!   standoff text <DOC> <TOKEN_KEY>        # Text covered by a token
//!
//! Logs go to stderr (RUST_LOG, default `info`); stdout carries only JSON.

use anyhow::{Context, Result};
use clap::Parser;
use standoff::cli::{execute, Cli};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = cli.root.canonicalize().unwrap_or_else(|_| cli.root.clone());
    let config = cli.load_config().context("loading configuration")?;

    let value = execute(&cli.command, &root, &config)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
