use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{retry_delay, SearchHit, SearchProvider};
use crate::config::SearchConfig;
use crate::error::{Error, Result};

const BING_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";

/// Bing Web Search v7.
pub struct BingSearch {
    client: Client,
    key: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl BingSearch {
    pub fn new(client: Client, key: String, config: &SearchConfig) -> Self {
        Self {
            client,
            key,
            max_retries: config.max_retries.max(1),
            backoff_base_ms: config.qps_delay_ms,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingResponse {
    #[serde(default)]
    web_pages: Option<BingWebPages>,
}

#[derive(Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingPage>,
}

#[derive(Deserialize)]
struct BingPage {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: String,
}

#[async_trait]
impl SearchProvider for BingSearch {
    fn name(&self) -> &'static str {
        "bing"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let count = limit.clamp(1, 10).to_string();
        let mut last_reason = String::new();

        for attempt in 0..self.max_retries {
            let response = self
                .client
                .get(BING_ENDPOINT)
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .query(&[("q", query), ("count", count.as_str())])
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: BingResponse = resp.json().await.map_err(|e| Error::Search {
                        provider: self.name(),
                        reason: format!("malformed response: {}", e),
                    })?;
                    let hits: Vec<SearchHit> = parsed
                        .web_pages
                        .map(|pages| pages.value)
                        .unwrap_or_default()
                        .into_iter()
                        .filter(|page| !page.url.is_empty())
                        .map(|page| SearchHit {
                            url: page.url,
                            title: page.name,
                        })
                        .collect();
                    debug!(query, hits = hits.len(), "bing query done");
                    return Ok(hits);
                }
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Err(Error::Search {
                            provider: self.name(),
                            reason: format!("status {}", status),
                        });
                    }
                    last_reason = format!("status {}", status);
                }
                Err(e) => {
                    last_reason = e.to_string();
                }
            }
            if let Some(delay) = retry_delay(attempt, self.max_retries, self.backoff_base_ms) {
                tokio::time::sleep(delay).await;
            }
        }

        Err(Error::Search {
            provider: self.name(),
            reason: format!("gave up after {} attempts: {}", self.max_retries, last_reason),
        })
    }
}
