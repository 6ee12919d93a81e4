// Website resolution via pluggable search providers. Providers are trait
// objects so a missing credential just means one less provider, and tests
// can drop in a canned one.
mod bing;
mod google_cse;

pub use bing::BingSearch;
pub use google_cse::GoogleCse;

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SearchConfig;
use crate::error::{Error, Result};

/// Hosts that never count as a company's official site.
pub const BAD_HOSTS: &[&str] = &[
    "facebook.com",
    "linkedin.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "youtube.com",
    "wikipedia.org",
    "reddit.com",
    "medium.com",
    "blogspot.com",
    "wordpress.com",
    "pinterest.com",
    "foursquare.com",
    "yelp.com",
    "opentable.com",
    "amazon.com",
    "tumblr.com",
];

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Backoff before the next retry: exponential with jitter, or `None` once
/// the final attempt has been spent so a doomed call fails without one last
/// pointless sleep.
pub(crate) fn retry_delay(attempt: u32, max_retries: u32, base_ms: u64) -> Option<Duration> {
    if attempt + 1 >= max_retries {
        return None;
    }
    let base = base_ms.max(100);
    let exp = base.saturating_mul(1u64 << attempt.min(6));
    let jitter = fastrand::u64(0..=base);
    Some(Duration::from_millis(exp + jitter))
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
}

pub fn is_bad_host(url: &str) -> bool {
    match host_of(url) {
        Some(host) => BAD_HOSTS
            .iter()
            .any(|bad| host == *bad || host.ends_with(&format!(".{}", bad))),
        None => true,
    }
}

/// Two URLs/hosts belong to the same site when one host is the other or a
/// subdomain of it (after stripping a leading www).
pub fn same_site(url: &str, site_host: &str) -> bool {
    let site = site_host.trim_start_matches("www.").to_lowercase();
    match host_of(url) {
        Some(host) => {
            host == site
                || host.ends_with(&format!(".{}", site))
                || site.ends_with(&format!(".{}", host))
        }
        None => false,
    }
}

/// A Domain cell that is already a bare domain ("acme.co.uk") short-circuits
/// search entirely.
pub fn looks_like_domain(hint: &str) -> bool {
    let h = hint.trim();
    !h.is_empty()
        && h.contains('.')
        && !h.contains('/')
        && !h.contains('@')
        && !h.contains(char::is_whitespace)
}

/// Tie-break between credible candidates: a host matching the domain hint
/// wins, then a host containing the company's first name token, then the
/// provider's top rank.
pub fn pick_candidate<'a>(
    candidates: &'a [String],
    company: &str,
    domain_hint: Option<&str>,
) -> Option<&'a String> {
    if candidates.is_empty() {
        return None;
    }
    if let Some(hint) = domain_hint {
        let root = hint.trim().to_lowercase();
        let root = root.split('.').next().unwrap_or("").to_string();
        if !root.is_empty() {
            if let Some(hit) = candidates
                .iter()
                .find(|c| host_of(c).is_some_and(|h| h.contains(&root)))
            {
                return Some(hit);
            }
        }
    }
    let token: String = company
        .split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if token.len() >= 3 {
        if let Some(hit) = candidates
            .iter()
            .find(|c| host_of(c).is_some_and(|h| h.contains(&token)))
        {
            return Some(hit);
        }
    }
    candidates.first()
}

pub struct WebsiteResolver {
    providers: Vec<Box<dyn SearchProvider>>,
    config: SearchConfig,
    default_location: Option<String>,
}

impl WebsiteResolver {
    pub fn new(
        providers: Vec<Box<dyn SearchProvider>>,
        config: SearchConfig,
        default_location: Option<String>,
    ) -> Self {
        Self {
            providers,
            config,
            default_location,
        }
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Find the company's official site. Returns Ok(None) when search is
    /// disabled or turned up nothing credible; Err only when every provider
    /// failed outright.
    pub async fn resolve(&self, company: &str, domain_hint: Option<&str>) -> Result<Option<String>> {
        let company = company.trim();
        if company.is_empty() {
            return Ok(None);
        }
        if let Some(hint) = domain_hint {
            if looks_like_domain(hint) {
                let url = format!("https://{}", hint.trim().to_lowercase());
                debug!(%url, "domain hint used directly, search skipped");
                return Ok(Some(url));
            }
        }
        if self.providers.is_empty() {
            debug!("no search provider configured, skipping website resolution");
            return Ok(None);
        }

        let mut candidates: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut last_err: Option<Error> = None;
        let mut any_success = false;

        for query in self.queries(company, domain_hint) {
            for provider in &self.providers {
                match provider.search(&query, 5).await {
                    Ok(hits) => {
                        any_success = true;
                        for hit in hits {
                            if hit.url.is_empty() || is_bad_host(&hit.url) {
                                continue;
                            }
                            if seen.insert(hit.url.clone()) {
                                candidates.push(hit.url);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(provider = provider.name(), query = %query, "search failed: {}", e);
                        last_err = Some(e);
                    }
                }
            }
            // First query that yields anything is good enough.
            if !candidates.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.config.qps_delay_ms)).await;
        }

        if candidates.is_empty() {
            return match (any_success, last_err) {
                // Every provider call failed: surface it so the row is
                // marked Error rather than NotFound.
                (false, Some(e)) => Err(e),
                _ => Ok(None),
            };
        }

        let chosen = pick_candidate(&candidates, company, domain_hint).cloned();
        if let Some(url) = &chosen {
            info!(company, %url, "website resolved");
        }
        Ok(chosen)
    }

    /// Fallback when the site crawl found nothing: ask the providers for
    /// contact-ish pages on the resolved site's own domain. Transient
    /// failures are swallowed; this path is best-effort.
    pub async fn contact_hunt(&self, site_url: &str) -> Vec<String> {
        let Some(domain) = host_of(site_url) else {
            return Vec::new();
        };
        if self.providers.is_empty() {
            return Vec::new();
        }

        let queries = [
            format!("site:{} contact", domain),
            format!("site:{} email", domain),
            format!("site:{} get in touch", domain),
        ];

        let mut results: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        'outer: for query in &queries {
            for provider in &self.providers {
                let hits = match provider.search(query, 5).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!(provider = provider.name(), "contact hunt query failed: {}", e);
                        continue;
                    }
                };
                for hit in hits {
                    if hit.url.is_empty() || is_bad_host(&hit.url) {
                        continue;
                    }
                    if !same_site(&hit.url, &domain) {
                        continue;
                    }
                    if seen.insert(hit.url.clone()) {
                        results.push(hit.url);
                        if results.len() >= self.config.max_candidates {
                            break 'outer;
                        }
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(self.config.qps_delay_ms)).await;
        }

        debug!(site = %site_url, candidates = results.len(), "contact hunt finished");
        results
    }

    fn queries(&self, company: &str, domain_hint: Option<&str>) -> Vec<String> {
        let mut queries = Vec::new();
        if let Some(hint) = domain_hint {
            let hint = hint.trim().to_lowercase();
            if !hint.is_empty() {
                queries.push(format!("{} site:{}", company, hint));
            }
        }
        queries.push(format!("{} official site", company));
        if let Some(location) = &self.default_location {
            queries.push(format!("{} {} official site", company, location));
        }
        queries.push(format!("{} website", company));
        queries.push(company.to_string());
        queries
    }
}
