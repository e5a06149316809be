//! fetch command: Resilient fetch of one or more URLs
//!
//! Structured JSON/YAML on stdout, progress and the optional domain health
//! report on stderr.

use anyhow::{Context, Result};
use clap::Args;
use futures::future::join_all;
use royalbit_fetch::{
    extract_domain, DomainHealthTracker, DomainMetrics, FetchConfig, FetchResult, FetchStatus, FetchStrategy,
    LiveTransport, ResilientFetcher,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::debug;

/// Configuration sources shared by every command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// YAML config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base proxy URL used for geo-targeted escalation
    #[arg(long, env = "FETCH_PROXY_URL")]
    pub proxy: Option<String>,

    /// Minimum delay between requests to the same domain, in milliseconds
    #[arg(long)]
    pub min_delay: Option<u64>,

    /// Normal-strategy tries on connection errors
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub retries: Option<u32>,
}

impl ConfigArgs {
    /// Defaults < config file < environment < flags
    pub fn load(&self) -> Result<FetchConfig> {
        let mut config = FetchConfig::load(self.config.as_deref()).with_context(|| {
            match &self.config {
                Some(path) => format!("Failed to load config: {}", path.display()),
                None => "Failed to load config".to_string(),
            }
        })?;
        if let Some(proxy) = &self.proxy {
            config.proxy_url = Some(proxy.clone());
        }
        if let Some(ms) = self.min_delay {
            config.min_delay_ms = ms;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
pub struct FetchArgs {
    /// URLs to fetch (multiple allowed)
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Output format: json (default) or yaml
    #[arg(long, short, default_value = "json")]
    pub format: String,

    /// URLs fetched concurrently
    #[arg(long, short, default_value = "4")]
    pub parallel: usize,

    /// Max content length per page (defaults to the configured limit)
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Return raw HTML instead of extracted text
    #[arg(long)]
    pub raw: bool,

    /// ISO 3166-1 alpha-2 country for the proxy (default: from the ccTLD)
    #[arg(long)]
    pub country: Option<String>,

    /// Print the domain health report to stderr when done
    #[arg(long)]
    pub report: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// One fetched page
#[derive(Debug, Serialize, Clone)]
pub struct Page {
    pub url: String,
    pub ok: bool,
    pub status: FetchStatus,
    pub strategy: FetchStrategy,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub len: usize,
    pub ms: u64,
}

impl Page {
    fn from_result(url: String, result: FetchResult) -> Self {
        let ok = result.is_ok();
        let text = if ok {
            Some(result.content().to_string())
        } else {
            None
        };
        Page {
            url,
            ok,
            status: result.status(),
            strategy: result.strategy(),
            domain: result.domain().to_string(),
            http_status: result.http_status(),
            err: result.error_message().map(str::to_string),
            len: text.as_ref().map(|t| t.chars().count()).unwrap_or(0),
            text,
            ms: result.elapsed_ms().round() as u64,
        }
    }

    /// The task fetching `url` died before producing a result
    fn task_failed(url: String, message: &str) -> Self {
        let domain = extract_domain(&url).unwrap_or_default();
        let result = FetchResult::failed(
            FetchStatus::Error,
            FetchStrategy::Normal,
            domain,
            None,
            Some(message.to_string()),
        );
        Self::from_result(url, result)
    }
}

/// Results wrapper for multiple pages
#[derive(Debug, Serialize)]
pub struct FetchResults {
    pub pages: Vec<Page>,
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<DomainMetrics>,
}

pub async fn run_fetch(args: FetchArgs) -> Result<()> {
    let config = args.config.load()?;
    let url_count = args.urls.len();
    let parallel = args.parallel.min(url_count).max(1);

    eprintln!(
        "Fetching {} URL{} ({} parallel)...",
        url_count,
        if url_count == 1 { "" } else { "s" },
        parallel
    );

    let transport = Arc::new(LiveTransport::new());
    let health = Arc::new(DomainHealthTracker::new(config.health_window()));
    let fetcher = Arc::new(
        ResilientFetcher::new(config, transport.clone())
            .with_health_tracker(Arc::clone(&health)),
    );
    let slots = Arc::new(Semaphore::new(parallel));

    let tasks: Vec<_> = args
        .urls
        .iter()
        .cloned()
        .map(|url| {
            let fetcher = Arc::clone(&fetcher);
            let health = Arc::clone(&health);
            let slots = Arc::clone(&slots);
            let country = args.country.clone();
            let (max_chars, raw) = (args.max_chars, args.raw);
            tokio::spawn(async move {
                let _slot = slots.acquire_owned().await.ok();
                eprintln!("  -> {}", truncate(&url, 60));
                let result = fetcher
                    .resilient_fetch(&url, max_chars, raw, country.as_deref())
                    .await;
                if !result.domain().is_empty() {
                    health.record(&result);
                }
                Page::from_result(url, result)
            })
        })
        .collect();

    let results = collect_pages(join_all(tasks).await, args.urls);

    transport.close().await;
    let evicted = fetcher.throttle().evict_idle(health.window());
    debug!(evicted, "dropped idle throttle state");

    let ok_count = results.iter().filter(|p| p.ok).count();
    let failed_count = results.len() - ok_count;

    let output = if results.len() == 1 {
        render(&results[0], &args.format)?
    } else {
        let fetch_results = FetchResults {
            pages: results,
            total: url_count,
            ok: ok_count,
            failed: failed_count,
            domains: if args.report {
                health.all_metrics()
            } else {
                Vec::new()
            },
        };
        render(&fetch_results, &args.format)?
    };

    println!("{}", output);
    if args.report {
        eprintln!("{}", health.report());
    }
    eprintln!("Done: {}/{} OK", ok_count, url_count);

    Ok(())
}

/// One page per URL, in input order, even for tasks that died
fn collect_pages(joined: Vec<Result<Page, JoinError>>, urls: Vec<String>) -> Vec<Page> {
    joined
        .into_iter()
        .zip(urls)
        .map(|(joined, url)| {
            joined.unwrap_or_else(|e| Page::task_failed(url, &format!("fetch task failed: {}", e)))
        })
        .collect()
}

fn render<T: Serialize>(value: &T, format: &str) -> Result<String> {
    Ok(match format {
        "yaml" | "yml" => serde_yaml::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    })
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
