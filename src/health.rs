//! Per-domain health over a rolling window
//!
//! Every recorded [`FetchResult`] becomes a [`DomainEvent`]. Events older
//! than the window are pruned on every write and before every read; a
//! domain whose events have all aged out is forgotten entirely.

use crate::types::{FetchResult, FetchStatus, FetchStrategy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Block rate above which a domain is unhealthy
const UNHEALTHY_BLOCK_RATE: f64 = 50.0;
/// Block rate above which stealth is the recommended starting strategy
const STEALTH_BLOCK_RATE: f64 = 30.0;

/// Wall-clock source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub timestamp: DateTime<Utc>,
    pub status: FetchStatus,
    pub strategy: FetchStrategy,
    pub http_status: Option<u16>,
    pub elapsed_ms: f64,
}

/// Aggregates over a domain's retained events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainMetrics {
    pub domain: String,
    pub total_requests: usize,
    pub success_count: usize,
    pub blocked_count: usize,
    pub rate_limited_count: usize,
    pub error_count: usize,
    pub empty_count: usize,
    pub stealth_escalations: usize,
    pub stealth_successes: usize,
    pub avg_response_time_ms: f64,
    pub success_rate: f64,
    pub block_rate: f64,
    pub last_status: FetchStatus,
    pub last_fetch_time: DateTime<Utc>,
}

impl DomainMetrics {
    pub fn rate_limited_rate(&self) -> f64 {
        percent(self.rate_limited_count, self.total_requests)
    }

    pub fn error_rate(&self) -> f64 {
        percent(self.error_count, self.total_requests)
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Default)]
struct DomainLedger {
    events: VecDeque<DomainEvent>,
    stealth_escalations: usize,
    stealth_successes: usize,
}

impl DomainLedger {
    fn push(&mut self, event: DomainEvent) {
        if event.strategy.is_stealth() {
            self.stealth_escalations += 1;
            if event.status == FetchStatus::Ok {
                self.stealth_successes += 1;
            }
        }
        self.events.push_back(event);
    }

    /// Drop events strictly older than `cutoff`, keeping the stealth
    /// counters in step
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while let Some(front) = self.events.front() {
            if front.timestamp >= cutoff {
                break;
            }
            if front.strategy.is_stealth() {
                self.stealth_escalations = self.stealth_escalations.saturating_sub(1);
                if front.status == FetchStatus::Ok {
                    self.stealth_successes = self.stealth_successes.saturating_sub(1);
                }
            }
            self.events.pop_front();
        }
    }

    fn metrics(&self, domain: &str) -> Option<DomainMetrics> {
        let last = self.events.back()?;
        let total = self.events.len();
        let count = |status: FetchStatus| self.events.iter().filter(|e| e.status == status).count();
        let success_count = count(FetchStatus::Ok);
        let blocked_count = count(FetchStatus::Blocked);
        let elapsed_sum: f64 = self.events.iter().map(|e| e.elapsed_ms).sum();

        Some(DomainMetrics {
            domain: domain.to_string(),
            total_requests: total,
            success_count,
            blocked_count,
            rate_limited_count: count(FetchStatus::RateLimited),
            error_count: count(FetchStatus::Error),
            empty_count: count(FetchStatus::Empty),
            stealth_escalations: self.stealth_escalations,
            stealth_successes: self.stealth_successes,
            avg_response_time_ms: elapsed_sum / total as f64,
            success_rate: percent(success_count, total),
            block_rate: percent(blocked_count, total),
            last_status: last.status,
            last_fetch_time: last.timestamp,
        })
    }
}

/// Thread-safe rolling-window ledger of fetch outcomes per domain
pub struct DomainHealthTracker {
    window: Duration,
    clock: Arc<dyn Clock>,
    domains: Mutex<HashMap<String, DomainLedger>>,
}

impl DomainHealthTracker {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn ledgers(&self) -> MutexGuard<'_, HashMap<String, DomainLedger>> {
        self.domains.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let millis = self.window.as_millis().min(i64::MAX as u128) as i64;
        now.checked_sub_signed(chrono::Duration::milliseconds(millis))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn record(&self, result: &FetchResult) {
        let now = self.clock.now();
        let cutoff = self.cutoff(now);
        let mut ledgers = self.ledgers();
        let ledger = ledgers.entry(result.domain().to_string()).or_default();

        // Keep each domain's sequence non-decreasing even if the clock steps back.
        let timestamp = match ledger.events.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        ledger.push(DomainEvent {
            timestamp,
            status: result.status(),
            strategy: result.strategy(),
            http_status: result.http_status(),
            elapsed_ms: result.elapsed_ms(),
        });
        ledger.prune(cutoff);
    }

    /// `None` if the domain is unknown or all its events have aged out
    pub fn metrics(&self, domain: &str) -> Option<DomainMetrics> {
        let cutoff = self.cutoff(self.clock.now());
        let mut ledgers = self.ledgers();
        let ledger = ledgers.get_mut(domain)?;
        ledger.prune(cutoff);
        if ledger.events.is_empty() {
            ledgers.remove(domain);
            return None;
        }
        ledger.metrics(domain)
    }

    /// Every tracked domain, worst block rate first
    pub fn all_metrics(&self) -> Vec<DomainMetrics> {
        let cutoff = self.cutoff(self.clock.now());
        let mut ledgers = self.ledgers();
        ledgers.retain(|_, ledger| {
            ledger.prune(cutoff);
            !ledger.events.is_empty()
        });

        let mut metrics: Vec<DomainMetrics> = ledgers
            .iter()
            .filter_map(|(domain, ledger)| ledger.metrics(domain))
            .collect();
        metrics.sort_by(|a, b| {
            b.block_rate
                .total_cmp(&a.block_rate)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        metrics
    }

    /// False only if more than half of the retained requests were blocked
    pub fn is_healthy(&self, domain: &str) -> bool {
        self.metrics(domain)
            .map_or(true, |m| m.block_rate <= UNHEALTHY_BLOCK_RATE)
    }

    pub fn recommended_strategy(&self, domain: &str) -> FetchStrategy {
        match self.metrics(domain) {
            Some(m) if m.block_rate > STEALTH_BLOCK_RATE => FetchStrategy::Stealth,
            _ => FetchStrategy::Normal,
        }
    }

    /// Markdown summary of every tracked domain
    pub fn report(&self) -> String {
        let metrics = self.all_metrics();
        if metrics.is_empty() {
            return "No domain metrics recorded yet.".to_string();
        }

        let mut lines = vec![
            "# Domain Health Report".to_string(),
            format!(
                "Generated: {}",
                self.clock.now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
            String::new(),
            "## Summary".to_string(),
            format!("Total domains tracked: {}", metrics.len()),
            format!("Window: {}s", self.window.as_secs()),
            String::new(),
            "## Domain Metrics (sorted by block rate)".to_string(),
        ];

        for m in &metrics {
            lines.push(format!("### {}", m.domain));
            lines.push(format!("- Requests: {}", m.total_requests));
            lines.push(format!("- Success rate: {:.1}%", m.success_rate));
            lines.push(format!("- Block rate: {:.1}%", m.block_rate));
            lines.push(format!("- Rate limited: {}", m.rate_limited_count));
            lines.push(format!("- Errors: {}", m.error_count));
            lines.push(format!("- Empty: {}", m.empty_count));
            lines.push(format!("- Stealth escalations: {}", m.stealth_escalations));
            lines.push(format!("- Stealth successes: {}", m.stealth_successes));
            lines.push(format!("- Avg response time: {:.1}ms", m.avg_response_time_ms));
            lines.push(format!("- Last status: {}", m.last_status));
            lines.push(format!("- Last fetch: {}", m.last_fetch_time.to_rfc3339()));
            lines.push(String::new());
        }

        lines.join("\n")
    }
}
