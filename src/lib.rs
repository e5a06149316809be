//! royalbit-fetch: resilient web fetching
//!
//! - Per-domain throttling (concurrency + minimum spacing)
//! - Normal (reqwest) and stealth (headless Chrome) strategies
//! - Escalation normal -> normal+proxy -> stealth -> stealth+proxy
//! - Rolling-window domain health tracking

pub mod browser;
pub mod classify;
pub mod config;
pub mod crawler;
pub mod error;
pub mod escalation;
pub mod extract;
pub mod health;
pub mod http;
pub mod logging;
pub mod proxy;
pub mod throttle;
pub mod transport;
pub mod types;

pub use config::FetchConfig;
pub use crawler::{extract_domain, ResilientFetcher};
pub use error::{ConfigError, FetchFailure, TransportError};
pub use health::{DomainHealthTracker, DomainMetrics};
pub use throttle::{DomainThrottle, ThrottlePermit};
pub use transport::{LiveTransport, RawResponse, StealthOptions, Transport};
pub use types::{FetchResult, FetchStatus, FetchStrategy};
