//! Network and browser transport seam
//!
//! The crawler only sees [`Transport`]; the live implementation pairs the
//! reqwest client ([`crate::http`]) with headless Chrome ([`crate::browser`]).

use crate::browser::StealthBrowser;
use crate::error::TransportError;
use crate::http::HttpFetcher;
use async_trait::async_trait;
use std::time::Duration;

/// Status and body of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub html: String,
}

impl RawResponse {
    pub fn new(status: u16, html: impl Into<String>) -> Self {
        Self {
            status,
            html: html.into(),
        }
    }
}

/// Knobs for the stealth browser
#[derive(Debug, Clone, PartialEq)]
pub struct StealthOptions {
    pub timeout: Duration,
    /// CSS selector that must be present before the page is read
    pub wait_selector: Option<String>,
    /// Wait for interactive bot challenges to clear themselves
    pub solve_challenges: bool,
    pub headless: bool,
    pub block_webrtc: bool,
}

impl Default for StealthOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wait_selector: None,
            solve_challenges: true,
            headless: true,
            block_webrtc: true,
        }
    }
}

/// The two content-acquisition capabilities
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fast HTTP fetch, no JavaScript
    async fn normal_fetch(
        &self,
        url: &str,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<RawResponse, TransportError>;

    /// Full browser fetch
    async fn stealth_fetch(
        &self,
        url: &str,
        options: &StealthOptions,
        proxy: Option<&str>,
    ) -> Result<RawResponse, TransportError>;
}

/// reqwest for the normal path, Chrome for the stealth path
pub struct LiveTransport {
    http: HttpFetcher,
    browser: StealthBrowser,
}

impl LiveTransport {
    pub fn new() -> Self {
        Self {
            http: HttpFetcher::new(),
            browser: StealthBrowser::new(),
        }
    }

    /// Shut down any browser that was launched
    pub async fn close(&self) {
        self.browser.close().await;
    }
}

impl Default for LiveTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LiveTransport {
    async fn normal_fetch(
        &self,
        url: &str,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        self.http.fetch(url, timeout, proxy).await
    }

    async fn stealth_fetch(
        &self,
        url: &str,
        options: &StealthOptions,
        proxy: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        self.browser.fetch(url, options, proxy).await
    }
}
