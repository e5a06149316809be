//! Normal fetch strategy: plain HTTP with browser-like headers

use crate::error::TransportError;
use crate::transport::RawResponse;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// reqwest clients, one per proxy (clients bind their proxy at build time)
pub struct HttpFetcher {
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self, proxy: Option<&str>) -> Result<Client, TransportError> {
        let key = proxy.map(str::to_string);
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .default_headers(browser_headers())
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true);
        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| TransportError::Other(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("HTTP client error: {}", e)))?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// GET `url` within `timeout`. HTTP error statuses are returned, not raised.
    pub async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        let client = self.client(proxy)?;
        debug!(url, proxied = proxy.is_some(), "normal fetch");

        let response = client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_error(e, timeout))?;

        let status = response.status().as_u16();
        let html = response.text().await.map_err(|e| map_error(e, timeout))?;
        Ok(RawResponse::new(status, html))
    }
}

fn map_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() || e.is_request() || e.is_body() {
        TransportError::Connectivity(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers
}
