//! Fetch outcome types shared by the crawler, the health tracker and the CLI.

use serde::{Deserialize, Serialize};

/// Terminal classification of one strategy attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Readable content obtained
    Ok,
    /// 403 or a bot-challenge page
    Blocked,
    /// 429
    RateLimited,
    /// Connectivity failure, other HTTP error, or internal failure
    Error,
    /// Transport succeeded but nothing readable came back
    Empty,
}

impl FetchStatus {
    /// Outcomes that justify moving to a costlier strategy
    pub fn is_obstruction(self) -> bool {
        matches!(self, FetchStatus::Blocked | FetchStatus::RateLimited)
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Ok => write!(f, "ok"),
            FetchStatus::Blocked => write!(f, "blocked"),
            FetchStatus::RateLimited => write!(f, "rate_limited"),
            FetchStatus::Error => write!(f, "error"),
            FetchStatus::Empty => write!(f, "empty"),
        }
    }
}

/// Capability and proxy combination that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStrategy {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "normal+proxy")]
    NormalProxy,
    #[serde(rename = "stealth")]
    Stealth,
    #[serde(rename = "stealth+proxy")]
    StealthProxy,
}

impl FetchStrategy {
    pub fn is_stealth(self) -> bool {
        matches!(self, FetchStrategy::Stealth | FetchStrategy::StealthProxy)
    }

    pub fn uses_proxy(self) -> bool {
        matches!(self, FetchStrategy::NormalProxy | FetchStrategy::StealthProxy)
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Normal => write!(f, "normal"),
            FetchStrategy::NormalProxy => write!(f, "normal+proxy"),
            FetchStrategy::Stealth => write!(f, "stealth"),
            FetchStrategy::StealthProxy => write!(f, "stealth+proxy"),
        }
    }
}

/// Result of one `resilient_fetch` call.
///
/// Fields are private so an `Ok` result can only be built with content;
/// use [`FetchResult::ok`] and [`FetchResult::failed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    content: String,
    status: FetchStatus,
    strategy: FetchStrategy,
    domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    elapsed_ms: f64,
}

impl FetchResult {
    /// Successful result. Blank content is downgraded to `Empty`.
    pub fn ok(
        content: String,
        strategy: FetchStrategy,
        domain: impl Into<String>,
        http_status: Option<u16>,
    ) -> Self {
        let status = if content.trim().is_empty() {
            FetchStatus::Empty
        } else {
            FetchStatus::Ok
        };
        Self {
            content,
            status,
            strategy,
            domain: domain.into(),
            http_status,
            error_message: None,
            elapsed_ms: 0.0,
        }
    }

    /// Non-`Ok` result. Passing `FetchStatus::Ok` here yields `Empty`,
    /// since there is no content to carry.
    pub fn failed(
        status: FetchStatus,
        strategy: FetchStrategy,
        domain: impl Into<String>,
        http_status: Option<u16>,
        error_message: Option<String>,
    ) -> Self {
        let status = if status == FetchStatus::Ok {
            FetchStatus::Empty
        } else {
            status
        };
        Self {
            content: String::new(),
            status,
            strategy,
            domain: domain.into(),
            http_status,
            error_message,
            elapsed_ms: 0.0,
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    pub fn status(&self) -> FetchStatus {
        self.status
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(FetchStatus::Ok.to_string(), "ok");
        assert_eq!(FetchStatus::RateLimited.to_string(), "rate_limited");
        assert_eq!(FetchStatus::Empty.to_string(), "empty");
    }

    #[test]
    fn test_strategy_display_matches_serde() {
        for strategy in [
            FetchStrategy::Normal,
            FetchStrategy::NormalProxy,
            FetchStrategy::Stealth,
            FetchStrategy::StealthProxy,
        ] {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy));
        }
    }

    #[test]
    fn test_ok_with_blank_content_is_empty() {
        let result = FetchResult::ok("  \n".to_string(), FetchStrategy::Normal, "a.test", Some(200));
        assert_eq!(result.status(), FetchStatus::Empty);
        assert!(!result.is_ok());
    }

    #[test]
    fn test_failed_never_reports_ok() {
        let result = FetchResult::failed(FetchStatus::Ok, FetchStrategy::Stealth, "a.test", None, None);
        assert_eq!(result.status(), FetchStatus::Empty);
    }

    #[test]
    fn test_obstruction() {
        assert!(FetchStatus::Blocked.is_obstruction());
        assert!(FetchStatus::RateLimited.is_obstruction());
        assert!(!FetchStatus::Error.is_obstruction());
        assert!(!FetchStatus::Empty.is_obstruction());
    }

    #[test]
    fn test_serialize_skips_missing_fields() {
        let result = FetchResult::ok("hello".to_string(), FetchStrategy::Normal, "a.test", None)
            .with_elapsed_ms(12.5);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(!json.contains("http_status"));
        assert!(!json.contains("error_message"));
    }
}
