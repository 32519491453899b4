//! Fussball.de match scraper
//!
//! CLI for the match calendar and match pages of fussball.de, including
//! recovery of glyph-obfuscated text.

mod cli;
mod config;
mod retry;
mod scraper;
mod types;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout is reserved for results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fussball_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Matches {
            from,
            to,
            plz,
            page_size,
            details,
            no_cache,
            format,
        } => cli::run_matches(from, to, plz, page_size, details, no_cache, format).await,
        Commands::Match { link, no_cache } => cli::run_match(link, no_cache).await,
    }
}
