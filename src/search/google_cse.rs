use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{retry_delay, SearchHit, SearchProvider};
use crate::config::SearchConfig;
use crate::error::{Error, Result};

const CSE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Programmable Search (CSE) JSON API.
pub struct GoogleCse {
    client: Client,
    key: String,
    cx: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl GoogleCse {
    pub fn new(client: Client, key: String, cx: String, config: &SearchConfig) -> Self {
        Self {
            client,
            key,
            cx,
            max_retries: config.max_retries.max(1),
            backoff_base_ms: config.qps_delay_ms,
        }
    }
}

#[derive(Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Deserialize)]
struct CseItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
}

#[async_trait]
impl SearchProvider for GoogleCse {
    fn name(&self) -> &'static str {
        "google_cse"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let num = limit.clamp(1, 10).to_string();
        let mut last_reason = String::new();

        for attempt in 0..self.max_retries {
            let response = self
                .client
                .get(CSE_ENDPOINT)
                .query(&[
                    ("key", self.key.as_str()),
                    ("cx", self.cx.as_str()),
                    ("q", query),
                    ("num", num.as_str()),
                    ("safe", "off"),
                ])
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: CseResponse = resp.json().await.map_err(|e| Error::Search {
                        provider: self.name(),
                        reason: format!("malformed response: {}", e),
                    })?;
                    debug!(query, hits = parsed.items.len(), "cse query done");
                    return Ok(parsed
                        .items
                        .into_iter()
                        .filter(|item| !item.link.is_empty())
                        .map(|item| SearchHit {
                            url: item.link,
                            title: item.title,
                        })
                        .collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    // 429 and 5xx back off and retry; anything else is final.
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
