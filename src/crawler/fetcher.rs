use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::{CrawlConfig, ScraperApiConfig};
use crate::error::{Error, Result};

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page and return its HTML. Non-HTML responses and HTTP errors
    /// are reported as [`Error::Fetch`].
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

/// Direct HTTP fetcher, optionally routed through the ScraperAPI relay when
/// a key is configured.
pub struct HttpFetcher {
    client: Client,
    relay: Option<ScraperApiConfig>,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig, relay: Option<ScraperApiConfig>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, relay })
    }

    fn request_for(&self, url: &str) -> reqwest::RequestBuilder {
        match &self.relay {
            Some(relay) => {
                let mut params: Vec<(&str, String)> = vec![
                    ("api_key", relay.key.clone()),
                    ("url", url.to_string()),
                ];
                if let Some(country) = &relay.country {
                    params.push(("country_code", country.clone()));
                }
                if relay.render {
                    params.push(("render", "true".to_string()));
                }
                self.client.get(&relay.base).query(&params)
            }
            None => self.client.get(url),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        debug!(%url, relayed = self.relay.is_some(), "fetching page");

        let response = self.request_for(url).send().await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: format!("status {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let body = response.text().await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            reason: format!("body read failed: {}", e),
        })?;

        let is_html = content_type.contains("text/html")
            || content_type.contains("application/xhtml")
            || body.to_lowercase().contains("<html");
        if !is_html {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: format!("not HTML (content-type: {})", content_type),
            });
        }

        debug!(%url, bytes = body.len(), "page fetched");
        Ok(body)
    }
}
