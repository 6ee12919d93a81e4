// Per-site crawl: homepage first, then contact-looking pages on the same
// site, stopping early once both an email and a form were found.
mod contact_extractor;
mod fetcher;

pub use contact_extractor::{
    decode_cfemail, is_generic_inbox, is_noreply, rank_emails, ContactExtractor, FoundEmail,
    PageContacts,
};
pub use fetcher::{HttpFetcher, PageFetcher};

use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::search::{host_of, same_site};

/// Path fragments worth visiting when hunting for contact details.
const CONTACT_PATH_TOKENS: &[&str] = &[
    "contact",
    "get-in-touch",
    "getintouch",
    "about",
    "impressum",
    "kontakt",
    "support",
    "help",
    "find-us",
    "where-to-find-us",
    "privacy",
    "imprint",
    "team",
];

/// Everything one site crawl produced. Fetch failures degrade the outcome
/// instead of failing it; `first_error` keeps a diagnostic for Notes when
/// nothing at all could be read.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub emails: Vec<FoundEmail>,
    pub form_urls: Vec<String>,
    pub pages_fetched: usize,
    pub first_error: Option<String>,
}

impl CrawlOutcome {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.form_urls.is_empty()
    }
}

/// Links on the page that live on the same site and look contact-related.
pub fn contact_candidate_links(html: &str, base_url: &str, max: usize) -> Vec<String> {
    let Some(base_host) = host_of(base_url) else {
        return Vec::new();
    };
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let anchor_sel = Selector::parse("a[href]").unwrap();

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let url = resolved.to_string();
        if !same_site(&url, &base_host) {
            continue;
        }
        let path = resolved.path().to_lowercase();
        if !CONTACT_PATH_TOKENS.iter().any(|t| path.contains(t)) {
            continue;
        }
        if seen.insert(url.clone()) {
            links.push(url);
        }
        if links.len() >= max {
            break;
        }
    }
    links
}

pub struct SiteCrawler {
    fetcher: Box<dyn PageFetcher>,
    extractor: ContactExtractor,
    config: CrawlConfig,
}

impl SiteCrawler {
    pub fn new(fetcher: Box<dyn PageFetcher>, config: CrawlConfig) -> Self {
        Self {
            fetcher,
            extractor: ContactExtractor::new(),
            config,
        }
    }

    /// Crawl the homepage plus contact-looking pages of one site.
    pub async fn crawl_site(&self, website: &str) -> CrawlOutcome {
        let mut outcome = CrawlOutcome::default();

        let home_html = match self.fetcher.fetch_html(website).await {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(site = %website, "homepage fetch failed: {}", e);
                outcome.first_error = Some(e.to_string());
                None
            }
        };

        let mut pages = vec![website.to_string()];
        if let Some(html) = &home_html {
            pages.extend(contact_candidate_links(
                html,
                website,
                self.config.max_pages_per_site,
            ));
        }

        let mut visited = HashSet::new();
        for (i, url) in pages.iter().take(self.config.max_pages_per_site).enumerate() {
            if !visited.insert(url.clone()) {
                continue;
            }
            let html = if i == 0 {
                match &home_html {
                    Some(html) => html.clone(),
                    None => continue,
                }
            } else {
                tokio::time::sleep(Duration::from_millis(self.config.fetch_delay_ms)).await;
                match self.fetcher.fetch_html(url).await {
                    Ok(html) => html,
                    Err(e) => {
                        debug!(page = %url, "page fetch failed: {}", e);
                        if outcome.first_error.is_none() {
                            outcome.first_error = Some(e.to_string());
                        }
                        continue;
                    }
                }
            };

            let contacts = self.extractor.extract(&html, url);
            outcome.emails.extend(contacts.emails);
            outcome.form_urls.extend(contacts.form_urls);
            outcome.pages_fetched += 1;

            if !outcome.emails.is_empty() && !outcome.form_urls.is_empty() {
                break;
            }
        }

        dedup_emails(&mut outcome.emails);
        dedup_urls(&mut outcome.form_urls);
        debug!(
            site = %website,
            pages = outcome.pages_fetched,
            emails = outcome.emails.len(),
            forms = outcome.form_urls.len(),
            "site crawl finished"
        );
        outcome
    }

    /// Fetch and scan a single page found via the search fallback.
    pub async fn scan_page(&self, url: &str) -> Option<PageContacts> {
        match self.fetcher.fetch_html(url).await {
            Ok(html) => Some(self.extractor.extract(&html, url)),
            Err(e) => {
                debug!(page = %url, "fallback page fetch failed: {}", e);
                None
            }
        }
    }
}

/// Keep the first sighting of each address so SourceURL points at the page
/// where it was first seen.
fn dedup_emails(emails: &mut Vec<FoundEmail>) {
    let mut seen = HashSet::new();
    emails.retain(|e| seen.insert(e.address.clone()));
}

fn dedup_urls(urls: &mut Vec<String>) {
    let mut seen = HashSet::new();
    urls.retain(|u| seen.insert(u.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_links_stay_on_site_and_look_contactish() {
        let html = r#"
            <a href="/contact-us">Contact</a>
            <a href="/pricing">Pricing</a>
            <a href="https://acme.com/about">About</a>
            <a href="https://other.org/contact">Elsewhere</a>
            <a href="mailto:info@acme.com">Mail</a>
        "#;
        let links = contact_candidate_links(html, "https://acme.com/", 10);
        assert_eq!(
            links,
            vec![
                "https://acme.com/contact-us".to_string(),
                "https://acme.com/about".to_string(),
            ]
        );
    }

    #[test]
    fn candidate_links_respect_the_cap() {
        let html = r#"
            <a href="/contact">a</a>
            <a href="/about">b</a>
            <a href="/support">c</a>
        "#;
        let links = contact_candidate_links(html, "https://acme.com/", 2);
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn duplicate_emails_keep_first_source() {
        let mut emails = vec![
            FoundEmail {
                address: "info@acme.com".into(),
                source_url: "https://acme.com/".into(),
            },
            FoundEmail {
                address: "info@acme.com".into(),
                source_url: "https://acme.com/contact".into(),
            },
        ];
        dedup_emails(&mut emails);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].source_url, "https://acme.com/");
    }
}
