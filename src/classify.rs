//! Outcome classification for one strategy attempt
//!
//! 429 and 403 short-circuit. Otherwise the head of the page is checked
//! against known bot-challenge banners before any extraction happens.

use crate::extract::{clamp_text, ContentExtractor};
use crate::types::FetchStatus;

/// Only this many leading characters are scanned for signatures
const SIGNATURE_SCAN_CHARS: usize = 5000;

/// Built-in bot-challenge markers, lower case
pub const DEFAULT_BLOCK_SIGNATURES: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "challenge-platform",
    "checking your browser before accessing",
    "just a moment...",
    "attention required! | cloudflare",
    "enable javascript and cookies to continue",
    "ddos protection by",
    "captcha-delivery.com",
    "please verify you are a human",
    "verify you are human",
    "px-captcha",
    "access to this page has been denied",
    "request unsuccessful. incapsula incident",
    "_incapsula_resource",
    "sorry, you have been blocked",
];

/// Case-insensitive block-signature matcher
#[derive(Debug, Clone)]
pub struct BlockDetector {
    signatures: Vec<String>,
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl BlockDetector {
    /// Built-in signatures plus `extra`
    pub fn new(extra: &[String]) -> Self {
        let mut signatures: Vec<String> = DEFAULT_BLOCK_SIGNATURES
            .iter()
            .map(|s| s.to_string())
            .collect();
        for sig in extra {
            let sig = sig.trim().to_lowercase();
            if !sig.is_empty() && !signatures.contains(&sig) {
                signatures.push(sig);
            }
        }
        Self { signatures }
    }

    /// First matching signature within the scanned head of `html`
    pub fn matched(&self, html: &str) -> Option<&str> {
        let head = clamp_text(html, SIGNATURE_SCAN_CHARS).to_lowercase();
        self.signatures
            .iter()
            .find(|sig| head.contains(sig.as_str()))
            .map(String::as_str)
    }

    pub fn is_blocked(&self, html: &str) -> bool {
        self.matched(html).is_some()
    }
}

/// Classified attempt, before it is wrapped into a `FetchResult`
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub status: FetchStatus,
    pub content: String,
    pub error_message: Option<String>,
}

impl Classified {
    fn failed(status: FetchStatus, message: Option<String>) -> Self {
        Self {
            status,
            content: String::new(),
            error_message: message,
        }
    }
}

/// Classify one transport response.
///
/// In `raw` mode the (clamped) HTML itself is the content and no
/// extraction is done.
pub fn classify(
    http_status: u16,
    html: &str,
    detector: &BlockDetector,
    extractor: &dyn ContentExtractor,
    max_chars: usize,
    raw: bool,
) -> Classified {
    match http_status {
        429 => {
            return Classified::failed(FetchStatus::RateLimited, Some("HTTP 429".to_string()))
        }
        403 => return Classified::failed(FetchStatus::Blocked, Some("HTTP 403".to_string())),
        _ => {}
    }

    if let Some(sig) = detector.matched(html) {
        return Classified::failed(
            FetchStatus::Blocked,
            Some(format!("bot challenge detected ({})", sig)),
        );
    }

    if http_status >= 400 {
        return Classified::failed(FetchStatus::Error, Some(format!("HTTP {}", http_status)));
    }

    let content = if raw {
        html.trim().to_string()
    } else {
        extractor.extract(html).trim().to_string()
    };

    if content.is_empty() {
        let message = if raw {
            "no HTML content returned"
        } else {
            "no readable content extracted"
        };
        return Classified::failed(FetchStatus::Empty, Some(message.to_string()));
    }

    Classified {
        status: FetchStatus::Ok,
        content: clamp_text(&content, max_chars),
        error_message: None,
    }
}
