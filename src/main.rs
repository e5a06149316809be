//! fetch-tools CLI
//!
//! Resilient web fetching with per-domain throttling.
//! Escalates to geo-targeted proxies and headless Chrome when blocked.

use anyhow::Result;
use clap::{Parser, Subcommand};
use royalbit_fetch::logging::init_logging;

mod fetch;
mod stealth;

use fetch::{run_fetch, FetchArgs};
use stealth::{run_stealth, StealthArgs};

#[derive(Parser)]
#[command(name = "fetch-tools")]
#[command(author = "RoyalBit Inc.")]
#[command(version)]
#[command(about = "Resilient web fetching with bot-protection escalation")]
#[command(long_about = "Fetches pages over plain HTTP and escalates to geo-targeted proxies and headless Chrome when a site blocks or rate-limits.\n\nCommands:\n  fetch     Fetch URLs with automatic escalation\n  stealth   Scrape one URL with headless Chrome")]
struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch URLs, escalating normal -> proxy -> stealth on blocks
    Fetch(FetchArgs),
    /// Scrape one URL with headless Chrome only
    Stealth(StealthArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Fetch(args) => run_fetch(args).await,
        Commands::Stealth(args) => run_stealth(args).await,
    }
}
