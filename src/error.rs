//! Error types for transports, fetch wrappers and configuration

use crate::types::{FetchResult, FetchStatus, FetchStrategy};
use std::time::Duration;
use thiserror::Error;

/// Failure raised by a transport before any HTTP status is available
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// DNS, connect, TLS or reset failures
    #[error("connection failed: {0}")]
    Connectivity(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Browser launch or automation failure
    #[error("browser failure: {0}")]
    Browser(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Only connectivity failures and timeouts are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Connectivity(_) | TransportError::Timeout(_))
    }
}

/// Non-`ok` terminal result surfaced by the `fetch` wrappers
#[derive(Debug, Clone, Error)]
#[error("{message} (domain: {domain}, strategy: {strategy}{})", http_suffix(.http_status))]
pub struct FetchFailure {
    pub url: String,
    pub domain: String,
    pub status: FetchStatus,
    pub strategy: FetchStrategy,
    pub http_status: Option<u16>,
    pub message: String,
}

fn http_suffix(http_status: &Option<u16>) -> String {
    match http_status {
        Some(code) => format!(", HTTP {}", code),
        None => String::new(),
    }
}

impl FetchFailure {
    pub fn from_result(url: &str, result: &FetchResult) -> Self {
        let message = match result.error_message() {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => format!("fetch failed with status {} for {}", result.status(), url),
        };
        Self {
            url: url.to_string(),
            domain: result.domain().to_string(),
            status: result.status(),
            strategy: result.strategy(),
            http_status: result.http_status(),
            message,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("config invalid: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Connectivity("reset".into()).is_transient());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!TransportError::Browser("launch".into()).is_transient());
        assert!(!TransportError::Other("bad".into()).is_transient());
    }

    #[test]
    fn test_failure_uses_error_message() {
        let result = FetchResult::failed(
            FetchStatus::Error,
            FetchStrategy::Normal,
            "example.test",
            Some(500),
            Some("HTTP 500".to_string()),
        );
        let failure = FetchFailure::from_result("https://example.test/", &result);
        assert_eq!(
            failure.to_string(),
            "HTTP 500 (domain: example.test, strategy: normal, HTTP 500)"
        );
    }

    #[test]
    fn test_failure_templated_message() {
        let result = FetchResult::failed(
            FetchStatus::Blocked,
            FetchStrategy::StealthProxy,
            "example.de",
            None,
            None,
        );
        let failure = FetchFailure::from_result("https://example.de/", &result);
        let text = failure.to_string();
        assert!(text.starts_with("fetch failed with status blocked for https://example.de/"));
        assert!(text.contains("domain: example.de"));
        assert!(text.contains("strategy: stealth+proxy"));
        assert!(!text.contains("HTTP"));
    }
}
