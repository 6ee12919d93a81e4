use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Tuning knobs, loadable from config.yml. Credentials never live here;
/// those come from the environment (see [`Credentials`]).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub search: SearchConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlConfig {
    pub http_timeout_seconds: u64,
    pub fetch_delay_ms: u64,
    pub max_pages_per_site: usize,
    pub user_agent: String,
    /// When true, addresses on the company's own domain win over off-domain
    /// ones whenever at least one on-domain address was found.
    pub prefer_company_domain: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub qps_delay_ms: u64,
    pub max_retries: u32,
    pub max_candidates: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    pub max_rows: usize,
    pub row_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig {
                http_timeout_seconds: 15,
                fetch_delay_ms: 400,
                max_pages_per_site: 15,
                user_agent: "Mozilla/5.0 (compatible; ContactCrawler/1.0)".to_string(),
                prefer_company_domain: true,
            },
            search: SearchConfig {
                qps_delay_ms: 800,
                max_retries: 4,
                max_candidates: 4,
            },
            run: RunConfig {
                max_rows: 100,
                row_delay_ms: 500,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

pub async fn load_config(path: &str) -> Result<Config> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::config(format!("cannot read {}: {}", path, e)))?;
    let config: Config = serde_yaml::from_str(&content)
        .map_err(|e| Error::config(format!("invalid {}: {}", path, e)))?;
    Ok(config)
}

/// Credentials and identifiers from the environment. `GOOGLE_SA_JSON_B64`
/// and `SHEET_ID` are required; each search/relay credential is optional and
/// its absence simply disables that path.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub sa_json_b64: String,
    pub sheet_id: String,
    pub sheet_tab: String,
    pub google_cse_key: Option<String>,
    pub google_cse_cx: Option<String>,
    pub bing_api_key: Option<String>,
    pub scraperapi: Option<ScraperApiConfig>,
    pub default_location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScraperApiConfig {
    pub key: String,
    pub base: String,
    pub country: Option<String>,
    pub render: bool,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let sa_json_b64 = require_env("GOOGLE_SA_JSON_B64")?;
        let sheet_id = require_env("SHEET_ID")?;

        let scraperapi = env_opt("SCRAPERAPI_KEY").map(|key| ScraperApiConfig {
            key,
            base: env_str("SCRAPERAPI_BASE", "https://api.scraperapi.com"),
            country: env_opt("SCRAPERAPI_COUNTRY"),
            render: env_bool("SCRAPERAPI_RENDER", false),
        });

        let creds = Self {
            sa_json_b64,
            sheet_id,
            sheet_tab: env_str("SHEET_TAB", "Sheet1"),
            google_cse_key: env_opt("GOOGLE_CSE_KEY"),
            google_cse_cx: env_opt("GOOGLE_CSE_CX"),
            bing_api_key: env_opt("BING_API_KEY"),
            scraperapi,
            default_location: env_opt("DEFAULT_LOCATION"),
        };

        debug!(
            google_cse = creds.google_cse_key.is_some() && creds.google_cse_cx.is_some(),
            bing = creds.bing_api_key.is_some(),
            scraperapi = creds.scraperapi.is_some(),
            "optional credentials detected"
        );
        Ok(creds)
    }
}

fn require_env(name: &str) -> Result<String> {
    env_opt(name).ok_or_else(|| Error::config(format!("{} is not set", name)))
}

fn env_opt(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_str(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_opt(name) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "t" | "yes" | "y" | "on"),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.crawl.http_timeout_seconds, 15);
        assert_eq!(c.crawl.max_pages_per_site, 15);
        assert!(c.crawl.prefer_company_domain);
        assert_eq!(c.run.max_rows, 100);
    }

    #[test]
    fn config_yaml_round_trips() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.search.max_retries, 4);
        assert_eq!(parsed.logging.level, "info");
    }
}
