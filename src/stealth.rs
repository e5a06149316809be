//! stealth command: One headless Chrome scrape, no escalation

use crate::fetch::ConfigArgs;
use anyhow::{bail, Result};
use clap::Args;
use royalbit_fetch::{DomainHealthTracker, LiveTransport, ResilientFetcher, StealthOptions};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args)]
pub struct StealthArgs {
    /// URL to scrape
    pub url: String,

    /// CSS selector to wait for before reading the page
    #[arg(long)]
    pub wait_selector: Option<String>,

    /// Don't wait for bot challenges to clear
    #[arg(long)]
    pub no_solve: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Keep WebRTC enabled (may leak the real IP behind a proxy)
    #[arg(long)]
    pub allow_webrtc: bool,

    /// ISO 3166-1 alpha-2 country for the proxy (default: from the ccTLD)
    #[arg(long)]
    pub country: Option<String>,

    /// Max content length (defaults to the configured limit)
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Page timeout in milliseconds (defaults to the configured stealth timeout)
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

pub async fn run_stealth(args: StealthArgs) -> Result<()> {
    let config = args.config.load()?;
    let options = StealthOptions {
        timeout: args
            .timeout
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.stealth_timeout()),
        wait_selector: args.wait_selector,
        solve_challenges: !args.no_solve,
        headless: !args.headful,
        block_webrtc: !args.allow_webrtc,
    };

    eprintln!("Scraping {} with headless Chrome...", args.url);

    let transport = Arc::new(LiveTransport::new());
    let health = Arc::new(DomainHealthTracker::new(config.health_window()));
    let fetcher = ResilientFetcher::new(config, transport.clone())
        .with_health_tracker(health);

    let outcome = fetcher
        .stealth_scrape(&args.url, &options, args.max_chars, args.country.as_deref())
        .await;
    transport.close().await;

    match outcome {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(failure) => bail!("{}", failure),
    }
}
