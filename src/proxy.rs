//! Geo-targeted proxy selection
//!
//! The country comes from an explicit override or the domain's ccTLD.
//! How a country is encoded into a proxy URL is vendor specific, so it sits
//! behind [`ProxyProvider`]; [`GeoMarkerProxy`] implements the common
//! "marker in the password" convention.

use url::Url;

/// Two-letter TLDs that are used generically and say nothing about location
const GENERIC_TLDS: &[&str] = &[
    "ai", "cc", "co", "eu", "fm", "gg", "io", "ly", "me", "sh", "so", "to", "tv", "ws",
];

/// Password marker prefix for [`GeoMarkerProxy`]
const COUNTRY_MARKER: &str = "-country-";

/// Builds the outbound proxy URL for a target country
pub trait ProxyProvider: Send + Sync {
    /// Proxy URL egressing from `country` (ISO 3166-1 alpha-2, upper case),
    /// or `None` if this provider cannot target it
    fn proxy_for(&self, country: &str) -> Option<String>;
}

/// Appends `-country-XX` to the password of a base proxy URL
#[derive(Debug, Clone)]
pub struct GeoMarkerProxy {
    base: String,
}

impl GeoMarkerProxy {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl ProxyProvider for GeoMarkerProxy {
    fn proxy_for(&self, country: &str) -> Option<String> {
        geo_targeted_proxy(&self.base, country)
    }
}

/// Same proxy for every country
#[derive(Debug, Clone)]
pub struct StaticProxy {
    url: String,
}

impl StaticProxy {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ProxyProvider for StaticProxy {
    fn proxy_for(&self, _country: &str) -> Option<String> {
        Some(self.url.clone())
    }
}

/// Country implied by the domain's ccTLD, upper case. `None` for generic
/// TLDs, IP addresses and single-label hosts.
pub fn detect_country_code(domain: &str) -> Option<String> {
    let host = domain.trim_end_matches('.');
    let (_, tld) = host.rsplit_once('.')?;
    let tld = tld.to_ascii_lowercase();
    if tld.len() != 2 || !tld.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    if GENERIC_TLDS.contains(&tld.as_str()) {
        return None;
    }
    if tld == "uk" {
        return Some("GB".to_string());
    }
    Some(tld.to_ascii_uppercase())
}

/// Override if it is a valid alpha-2 code, else the ccTLD of `domain`
pub fn resolve_country(domain: &str, country_override: Option<&str>) -> Option<String> {
    match country_override.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) if code.len() == 2 && code.bytes().all(|b| b.is_ascii_alphabetic()) => {
            Some(code.to_ascii_uppercase())
        }
        _ => detect_country_code(domain),
    }
}

/// Inject the country marker into the password of `proxy_url`.
///
/// Returns the URL unchanged if a marker is already present, and `None` if
/// the URL does not parse or carries no password to mark.
pub fn geo_targeted_proxy(proxy_url: &str, country: &str) -> Option<String> {
    let mut url = Url::parse(proxy_url).ok()?;
    let password = url.password()?.to_string();
    if password.to_ascii_lowercase().contains(COUNTRY_MARKER) {
        return Some(url.to_string());
    }
    let marked = format!("{}{}{}", password, COUNTRY_MARKER, country.to_ascii_uppercase());
    url.set_password(Some(&marked)).ok()?;
    Some(url.to_string())
}
