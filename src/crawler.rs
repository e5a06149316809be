//! Resilient fetch: throttled attempts, retries and strategy escalation
//!
//! [`ResilientFetcher::resilient_fetch`] never fails; every outcome comes
//! back as a [`FetchResult`]. The `fetch`, `fetch_raw` and `stealth_scrape`
//! wrappers turn non-`ok` results into [`FetchFailure`] and record every
//! result in the attached health tracker.

use crate::classify::{classify, BlockDetector};
use crate::config::FetchConfig;
use crate::error::{FetchFailure, TransportError};
use crate::escalation::{next_stage, Stage, Transition};
use crate::extract::{ContentExtractor, Html2TextExtractor};
use crate::health::DomainHealthTracker;
use crate::proxy::{resolve_country, GeoMarkerProxy, ProxyProvider};
use crate::throttle::DomainThrottle;
use crate::transport::{StealthOptions, Transport};
use crate::types::{FetchResult, FetchStatus, FetchStrategy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Headroom over `StealthOptions::timeout` so the browser's own deadline
/// fires first and it gets to close its tab
const STEALTH_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Host of `url`, lower case, used as the throttle and health key
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

pub struct ResilientFetcher {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn ContentExtractor>,
    throttle: Arc<DomainThrottle>,
    detector: BlockDetector,
    proxy: Option<Arc<dyn ProxyProvider>>,
    health: Option<Arc<DomainHealthTracker>>,
}

impl ResilientFetcher {
    /// Throttle, block signatures and proxy come from `config`; the
    /// extractor defaults to html2text.
    pub fn new(config: FetchConfig, transport: Arc<dyn Transport>) -> Self {
        let proxy = config
            .proxy_url
            .as_ref()
            .map(|url| Arc::new(GeoMarkerProxy::new(url.clone())) as Arc<dyn ProxyProvider>);
        Self {
            throttle: Arc::new(DomainThrottle::from_config(&config)),
            detector: BlockDetector::new(&config.block_signatures),
            extractor: Arc::new(Html2TextExtractor::default()),
            transport,
            proxy,
            health: None,
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_proxy_provider(mut self, proxy: Arc<dyn ProxyProvider>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_throttle(mut self, throttle: Arc<DomainThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_health_tracker(mut self, health: Arc<DomainHealthTracker>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn throttle(&self) -> &Arc<DomainThrottle> {
        &self.throttle
    }

    pub fn health(&self) -> Option<&Arc<DomainHealthTracker>> {
        self.health.as_ref()
    }

    /// Readable text of `url`, or the failure that stopped it
    pub async fn fetch(&self, url: &str, max_chars: Option<usize>) -> Result<String, FetchFailure> {
        self.fetch_checked(url, max_chars, false, None).await
    }

    /// Raw HTML of `url`, or the failure that stopped it
    pub async fn fetch_raw(
        &self,
        url: &str,
        max_chars: Option<usize>,
    ) -> Result<String, FetchFailure> {
        self.fetch_checked(url, max_chars, true, None).await
    }

    /// Like `fetch`, with an explicit proxy country
    pub async fn fetch_from(
        &self,
        url: &str,
        max_chars: Option<usize>,
        country: &str,
    ) -> Result<String, FetchFailure> {
        self.fetch_checked(url, max_chars, false, Some(country)).await
    }

    async fn fetch_checked(
        &self,
        url: &str,
        max_chars: Option<usize>,
        raw: bool,
        country: Option<&str>,
    ) -> Result<String, FetchFailure> {
        let result = self.resilient_fetch(url, max_chars, raw, country).await;
        self.record(&result);
        if result.is_ok() {
            Ok(result.into_content())
        } else {
            Err(FetchFailure::from_result(url, &result))
        }
    }

    fn record(&self, result: &FetchResult) {
        if let Some(health) = &self.health {
            if !result.domain().is_empty() {
                health.record(result);
            }
        }
    }

    /// Run the escalation machine for `url`. Never fails.
    ///
    /// `max_chars` defaults to the configured limit; `country` overrides
    /// ccTLD detection for the geo-targeted proxy.
    pub async fn resilient_fetch(
        &self,
        url: &str,
        max_chars: Option<usize>,
        raw: bool,
        country: Option<&str>,
    ) -> FetchResult {
        let started = Instant::now();
        let max_chars = max_chars.unwrap_or(self.config.max_chars);

        let Some(domain) = extract_domain(url) else {
            return FetchResult::failed(
                FetchStatus::Error,
                FetchStrategy::Normal,
                "",
                None,
                Some(format!("invalid URL: {}", url)),
            );
        };

        let proxy = self.geo_proxy(&domain, country);
        let stealth_options = self.stealth_options();
        let mut stage = self.starting_stage(&domain);

        let result = loop {
            let result = match stage {
                Stage::Normal => {
                    self.run_normal(url, &domain, &stealth_options, max_chars, raw)
                        .await
                }
                _ => {
                    self.attempt_once(
                        stage,
                        url,
                        &domain,
                        proxy.as_deref(),
                        &stealth_options,
                        max_chars,
                        raw,
                    )
                    .await
                }
            };

            match next_stage(stage, result.status(), proxy.is_some()) {
                Transition::Next(next) => {
                    info!(
                        domain = %domain,
                        from = %stage.strategy(),
                        to = %next.strategy(),
                        status = %result.status(),
                        "escalating fetch strategy"
                    );
                    stage = next;
                }
                Transition::Terminal => break result,
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if result.is_ok() {
            info!(domain = %domain, strategy = %result.strategy(), elapsed_ms, "fetched");
        } else {
            warn!(
                domain = %domain,
                strategy = %result.strategy(),
                status = %result.status(),
                error = result.error_message().unwrap_or(""),
                "fetch failed"
            );
        }
        result.with_elapsed_ms(elapsed_ms)
    }

    /// One stealth attempt, through the geo-targeted proxy when one can be
    /// built. Skips the escalation machine.
    pub async fn stealth_scrape(
        &self,
        url: &str,
        options: &StealthOptions,
        max_chars: Option<usize>,
        country: Option<&str>,
    ) -> Result<String, FetchFailure> {
        let started = Instant::now();
        let max_chars = max_chars.unwrap_or(self.config.max_chars);

        let result = match extract_domain(url) {
            Some(domain) => {
                let proxy = self.geo_proxy(&domain, country);
                let stage = if proxy.is_some() {
                    Stage::StealthProxy
                } else {
                    Stage::Stealth
                };
                self.attempt_once(stage, url, &domain, proxy.as_deref(), options, max_chars, false)
                    .await
            }
            None => FetchResult::failed(
                FetchStatus::Error,
                FetchStrategy::Stealth,
                "",
                None,
                Some(format!("invalid URL: {}", url)),
            ),
        }
        .with_elapsed_ms(started.elapsed().as_secs_f64() * 1000.0);

        self.record(&result);
        if result.is_ok() {
            Ok(result.into_content())
        } else {
            Err(FetchFailure::from_result(url, &result))
        }
    }

    fn stealth_options(&self) -> StealthOptions {
        StealthOptions {
            timeout: self.config.stealth_timeout(),
            ..StealthOptions::default()
        }
    }

    fn starting_stage(&self, domain: &str) -> Stage {
        match &self.health {
            Some(health)
                if self.config.skip_normal_for_hostile
                    && health.recommended_strategy(domain) == FetchStrategy::Stealth =>
            {
                info!(domain, "domain has a high block rate, starting with stealth");
                Stage::Stealth
            }
            _ => Stage::Normal,
        }
    }

    fn geo_proxy(&self, domain: &str, country: Option<&str>) -> Option<String> {
        let provider = self.proxy.as_ref()?;
        let country = resolve_country(domain, country)?;
        provider.proxy_for(&country)
    }

    /// Normal stage: retry transient failures with backoff, stop on anything
    /// else
    async fn run_normal(
        &self,
        url: &str,
        domain: &str,
        stealth: &StealthOptions,
        max_chars: usize,
        raw: bool,
    ) -> FetchResult {
        let max_retries = self.config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            match self
                .attempt(Stage::Normal, url, domain, None, stealth, max_chars, raw)
                .await
            {
                Ok(result) => return result,
                Err(e) if e.is_transient() && attempt + 1 < max_retries => {
                    let delay = self.config.backoff_delay(attempt);
                    debug!(
                        domain,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return transport_failure(Stage::Normal, domain, &e),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt_once(
        &self,
        stage: Stage,
        url: &str,
        domain: &str,
        proxy: Option<&str>,
        stealth: &StealthOptions,
        max_chars: usize,
        raw: bool,
    ) -> FetchResult {
        let proxy = if stage.needs_proxy() { proxy } else { None };
        match self
            .attempt(stage, url, domain, proxy, stealth, max_chars, raw)
            .await
        {
            Ok(result) => result,
            Err(e) => transport_failure(stage, domain, &e),
        }
    }

    /// One throttled transport call, classified. The throttle permit is
    /// held for the duration of the call and released on every exit.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        stage: Stage,
        url: &str,
        domain: &str,
        proxy: Option<&str>,
        stealth: &StealthOptions,
        max_chars: usize,
        raw: bool,
    ) -> Result<FetchResult, TransportError> {
        let strategy = stage.strategy();
        let _permit = self
            .throttle
            .acquire(domain)
            .await
            .map_err(|e| TransportError::Other(format!("throttle unavailable: {}", e)))?;

        debug!(domain, %strategy, "fetch attempt");
        let response = if strategy.is_stealth() {
            let limit = stealth.timeout + STEALTH_TIMEOUT_GRACE;
            bounded(limit, self.transport.stealth_fetch(url, stealth, proxy)).await?
        } else {
            let timeout = self.config.normal_timeout();
            bounded(timeout, self.transport.normal_fetch(url, timeout, proxy)).await?
        };

        let classified = classify(
            response.status,
            &response.html,
            &self.detector,
            self.extractor.as_ref(),
            max_chars,
            raw,
        );
        Ok(if classified.status == FetchStatus::Ok {
            FetchResult::ok(classified.content, strategy, domain, Some(response.status))
        } else {
            FetchResult::failed(
                classified.status,
                strategy,
                domain,
                Some(response.status),
                classified.error_message,
            )
        })
    }
}

/// Upper bound on a single transport call, whatever the transport does
async fn bounded<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

fn transport_failure(stage: Stage, domain: &str, error: &TransportError) -> FetchResult {
    FetchResult::failed(
        FetchStatus::Error,
        stage.strategy(),
        domain,
        None,
        Some(error.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://Example.TEST/path?q=1"),
            Some("example.test".to_string())
        );
        assert_eq!(
            extract_domain("http://shop.example.de:8080/"),
            Some("shop.example.de".to_string())
        );
        assert_eq!(extract_domain("ftp://example.test/"), None);
        assert_eq!(extract_domain("not a url"), None);
    }
}
