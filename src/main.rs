use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod crawler;
mod error;
mod models;
mod pipeline;
mod search;
mod sheets;

use config::{load_config, Config, Credentials};
use crawler::{HttpFetcher, SiteCrawler};
use error::Result;
use pipeline::{Orchestrator, RowProcessor};
use search::{BingSearch, GoogleCse, SearchProvider, WebsiteResolver};
use sheets::{SheetClient, TokenProvider};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let config = match load_config("config.yml").await {
        Ok(config) => config,
        Err(e) => {
            // Logging is not initialized yet, so this goes straight to stderr.
            eprintln!("Failed to load config.yml: {}. Using defaults.", e);
            Config::default()
        }
    };

    // Setup logging
    let directive = format!("contact_finder={},hyper=warn", config.logging.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)),
        )
        .init();

    // Fatal before any row is touched: bad credentials abort the whole run.
    let creds = Credentials::from_env()?;

    let api_client = reqwest::Client::new();
    let tokens = TokenProvider::from_b64(api_client.clone(), &creds.sa_json_b64)?;
    let sheet = SheetClient::new(
        api_client.clone(),
        tokens,
        creds.sheet_id.clone(),
        creds.sheet_tab.clone(),
    );

    let mut providers: Vec<Box<dyn SearchProvider>> = Vec::new();
    if let (Some(key), Some(cx)) = (&creds.google_cse_key, &creds.google_cse_cx) {
        providers.push(Box::new(GoogleCse::new(
            api_client.clone(),
            key.clone(),
            cx.clone(),
            &config.search,
        )));
    }
    if let Some(key) = &creds.bing_api_key {
        providers.push(Box::new(BingSearch::new(
            api_client.clone(),
            key.clone(),
            &config.search,
        )));
    }
    if providers.is_empty() {
        warn!("no search provider configured; rows without a Website cell will stay NotFound");
    }
    let resolver = WebsiteResolver::new(
        providers,
        config.search.clone(),
        creds.default_location.clone(),
    );

    let fetcher = HttpFetcher::new(&config.crawl, creds.scraperapi.clone())?;
    let crawler = SiteCrawler::new(Box::new(fetcher), config.crawl.clone());

    let processor = RowProcessor::new(resolver, crawler, config.search.clone(), &config.crawl);
    let app = Orchestrator::new(Box::new(sheet), processor, config.run.clone());

    info!(sheet = %creds.sheet_id, tab = %creds.sheet_tab, "starting contact finder run");

    tokio::select! {
        result = app.run() => {
            let summary = result?;
            info!(
                processed = summary.processed,
                found = summary.found,
                errors = summary.errors,
                "done"
            );
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
