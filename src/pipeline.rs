// Run orchestration: iterate rows needing processing, run
// resolver -> extractor -> writer per row, and never let one row's failure
// stop the batch.
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{CrawlConfig, RunConfig, SearchConfig};
use crate::crawler::{rank_emails, SiteCrawler};
use crate::error::Result;
use crate::models::{ContactRecord, RowUpdate, RunSummary, Status};
use crate::search::{host_of, WebsiteResolver};
use crate::sheets::{record_from_row, HeaderIndex, SheetStore};

/// Stages 2 and 3 of the pipeline for a single row. Infallible by design:
/// every failure becomes a Status/Notes pair on the row.
pub struct RowProcessor {
    resolver: WebsiteResolver,
    crawler: SiteCrawler,
    search: SearchConfig,
    prefer_company_domain: bool,
}

impl RowProcessor {
    pub fn new(resolver: WebsiteResolver, crawler: SiteCrawler, search: SearchConfig, crawl: &CrawlConfig) -> Self {
        Self {
            resolver,
            crawler,
            search,
            prefer_company_domain: crawl.prefer_company_domain,
        }
    }

    pub async fn process_row(&self, record: &ContactRecord) -> RowUpdate {
        // 1) Resolve the official site, unless the sheet already has one.
        let website = match &record.website {
            Some(url) => {
                info!(company = %record.company, %url, "using existing website");
                Some(url.clone())
            }
            None => match self
                .resolver
                .resolve(&record.company, record.domain_hint.as_deref())
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    warn!(company = %record.company, "website resolution failed: {}", e);
                    return RowUpdate::error(None, format!("website search failed: {}", e));
                }
            },
        };

        let Some(website) = website else {
            return RowUpdate {
                website: None,
                contact_email: None,
                contact_form_url: None,
                source_url: None,
                status: Status::NotFound,
                last_checked: Utc::now().to_rfc3339(),
                notes: "no website resolved".to_string(),
            };
        };

        // 2) Crawl the site itself.
        let outcome = self.crawler.crawl_site(&website).await;
        let mut emails = outcome.emails;
        let mut form_urls = outcome.form_urls;

        // 3) Still nothing: let the search provider point at contact pages.
        if emails.is_empty() && form_urls.is_empty() && self.resolver.has_providers() {
            info!(company = %record.company, "no email or form on site pages, trying search contact hunt");
            let candidates = self.resolver.contact_hunt(&website).await;
            for page in candidates.iter().take(self.search.max_candidates) {
                if let Some(contacts) = self.crawler.scan_page(page).await {
                    emails.extend(contacts.emails);
                    form_urls.extend(contacts.form_urls);
                }
                if !emails.is_empty() {
                    break;
                }
            }
        }

        // 4) Decide the outcome.
        let site_host = host_of(&website);
        let ranked = rank_emails(emails, site_host.as_deref(), self.prefer_company_domain);
        let now = Utc::now().to_rfc3339();

        if let Some(best) = ranked.first() {
            return RowUpdate {
                website: Some(website),
                contact_email: Some(best.address.clone()),
                contact_form_url: form_urls.first().cloned(),
                source_url: Some(best.source_url.clone()),
                status: Status::Found,
                last_checked: now,
                notes: format!("Found {} email(s)", ranked.len()),
            };
        }
        if let Some(form) = form_urls.first() {
            return RowUpdate {
                website: Some(website),
                contact_email: None,
                contact_form_url: Some(form.clone()),
                source_url: Some(form.clone()),
                status: Status::Found,
                last_checked: now,
                notes: "No email found; contact form available".to_string(),
            };
        }
        if outcome.pages_fetched == 0 {
            let reason = outcome
                .first_error
                .unwrap_or_else(|| "site unreachable".to_string());
            return RowUpdate::error(Some(website), truncate_note(&reason));
        }
        RowUpdate {
            website: Some(website),
            contact_email: None,
            contact_form_url: None,
            source_url: None,
            status: Status::NotFound,
            last_checked: now,
            notes: "No public email or contact form found".to_string(),
        }
    }
}

/// Notes is a sheet cell, not a log file.
fn truncate_note(reason: &str) -> String {
    const MAX: usize = 200;
    if reason.len() <= MAX {
        reason.to_string()
    } else {
        let cut: String = reason.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}

pub struct Orchestrator {
    sheet: Box<dyn SheetStore>,
    processor: RowProcessor,
    run: RunConfig,
}

impl Orchestrator {
    pub fn new(sheet: Box<dyn SheetStore>, processor: RowProcessor, run: RunConfig) -> Self {
        Self {
            sheet,
            processor,
            run,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let table = self.sheet.read_table().await?;
        // Fails before any row is touched when a column is missing.
        let index = HeaderIndex::from_headers(&table.headers)?;

        let mut summary = RunSummary::default();
        for (i, row) in table.rows.iter().enumerate() {
            let record = record_from_row(&index, i + 2, row);
            if record.company.trim().is_empty() {
                continue;
            }
            if !record.needs_processing() {
                summary.skipped += 1;
                continue;
            }
            if summary.processed >= self.run.max_rows {
                info!(max_rows = self.run.max_rows, "row budget reached, stopping");
                break;
            }

            info!(row = record.row, company = %record.company, "== processing ==");
            let update = self.processor.process_row(&record).await;

            match self.sheet.write_row_update(record.row, &index, &update).await {
                Ok(()) => match update.status {
                    Status::Found => summary.found += 1,
                    Status::NotFound => summary.not_found += 1,
                    Status::Error => summary.errors += 1,
                    Status::Pending => {}
                },
                // Auth loss means every later write fails too; stop here.
                Err(e) if e.is_fatal() => {
                    error!(row = record.row, "aborting run: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    // The write failed, not the row; count it and move on.
                    error!(row = record.row, "sheet write failed: {}", e);
                    summary.errors += 1;
                }
            }
            summary.processed += 1;

            tokio::time::sleep(Duration::from_millis(self.run.row_delay_ms)).await;
        }

        info!(
            processed = summary.processed,
            found = summary.found,
            not_found = summary.not_found,
            errors = summary.errors,
            skipped = summary.skipped,
            "run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawler::PageFetcher;
    use crate::error::Error;
    use crate::models::REQUIRED_COLUMNS;
    use crate::search::{SearchHit, SearchProvider};
    use crate::sheets::SheetTable;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct CannedProvider {
        results: HashMap<&'static str, Vec<&'static str>>,
        fail_everything: bool,
    }

    #[async_trait]
    impl SearchProvider for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn search(&self, query: &str, _limit: usize) -> crate::error::Result<Vec<SearchHit>> {
            if self.fail_everything {
                return Err(Error::Search {
                    provider: "canned",
                    reason: "timed out".into(),
                });
            }
            Ok(self
                .results
                .iter()
                .filter(|(needle, _)| query.contains(*needle))
                .flat_map(|(_, urls)| urls.iter())
                .map(|url| SearchHit {
                    url: url.to_string(),
                    title: String::new(),
                })
                .collect())
        }
    }

    struct CannedFetcher {
        pages: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl PageFetcher for CannedFetcher {
        async fn fetch_html(&self, url: &str) -> crate::error::Result<String> {
            match self.pages.get(url) {
                Some(html) => Ok(html.to_string()),
                None => Err(Error::Fetch {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    fn record(company: &str) -> ContactRecord {
        ContactRecord {
            row: 2,
            company: company.to_string(),
            domain_hint: None,
            website: None,
            contact_email: None,
            contact_form_url: None,
            source_url: None,
            status: Status::Pending,
            last_checked: None,
            notes: None,
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.search.qps_delay_ms = 1;
        config.search.max_retries = 1;
        config.crawl.fetch_delay_ms = 1;
        config
    }

    fn processor(provider: CannedProvider, fetcher: CannedFetcher) -> RowProcessor {
        let config = fast_config();
        let resolver = WebsiteResolver::new(
            vec![Box::new(provider)],
            config.search.clone(),
            None,
        );
        let crawler = SiteCrawler::new(Box::new(fetcher), config.crawl.clone());
        RowProcessor::new(resolver, crawler, config.search.clone(), &config.crawl)
    }

    #[tokio::test]
    async fn resolves_website_and_prefers_generic_email() {
        let provider = CannedProvider {
            results: HashMap::from([("Example Inc", vec!["https://example.com/"])]),
            fail_everything: false,
        };
        let fetcher = CannedFetcher {
            pages: HashMap::from([(
                "https://example.com/",
                r#"<p>Write to contact@example.com or jane.doe@example.com</p>"#,
            )]),
        };
        let update = processor(provider, fetcher)
            .process_row(&record("Example Inc"))
            .await;

        assert_eq!(update.status, Status::Found);
        assert!(update.website.as_deref().unwrap().contains("example.com"));
        assert_eq!(update.contact_email.as_deref(), Some("contact@example.com"));
        assert_eq!(update.source_url.as_deref(), Some("https://example.com/"));
        assert!(!update.last_checked.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_marks_row_error() {
        let provider = CannedProvider {
            results: HashMap::new(),
            fail_everything: true,
        };
        let fetcher = CannedFetcher {
            pages: HashMap::new(),
        };
        let update = processor(provider, fetcher)
            .process_row(&record("Example Inc"))
            .await;

        assert_eq!(update.status, Status::Error);
        assert!(update.notes.contains("website search failed"));
        assert!(update.contact_email.is_none());
    }

    #[tokio::test]
    async fn one_failed_row_does_not_poison_the_next() {
        // First record's resolution fails, second resolves fine: the
        // processor is stateless per row, so the second still succeeds.
        let failing = CannedProvider {
            results: HashMap::new(),
            fail_everything: true,
        };
        let update = processor(
            failing,
            CannedFetcher {
                pages: HashMap::new(),
            },
        )
        .process_row(&record("Broken Co"))
        .await;
        assert_eq!(update.status, Status::Error);

        let working = CannedProvider {
            results: HashMap::from([("Example Inc", vec!["https://example.com/"])]),
            fail_everything: false,
        };
        let update = processor(
            working,
            CannedFetcher {
                pages: HashMap::from([(
                    "https://example.com/",
                    "<p>hello@example.com</p>",
                )]),
            },
        )
        .process_row(&record("Example Inc"))
        .await;
        assert_eq!(update.status, Status::Found);
    }

    #[tokio::test]
    async fn unreachable_site_is_an_error_with_diagnostic() {
        let provider = CannedProvider {
            results: HashMap::from([("Example Inc", vec!["https://example.com/"])]),
            fail_everything: false,
        };
        let fetcher = CannedFetcher {
            pages: HashMap::new(),
        };
        let update = processor(provider, fetcher)
            .process_row(&record("Example Inc"))
            .await;

        assert_eq!(update.status, Status::Error);
        assert!(update.notes.contains("connection refused"));
        // The resolved website is still written so the next run can retry
        // the crawl without searching again.
        assert!(update.website.is_some());
    }

    #[tokio::test]
    async fn form_only_site_reports_form_url() {
        let provider = CannedProvider {
            results: HashMap::from([("Example Inc", vec!["https://example.com/"])]),
            fail_everything: false,
        };
        let fetcher = CannedFetcher {
            pages: HashMap::from([
                (
                    "https://example.com/",
                    r#"<a href="/contact">Contact us</a>"#,
                ),
                (
                    "https://example.com/contact",
                    r#"<form><input name="email"><textarea name="message"></textarea></form>"#,
                ),
            ]),
        };
        let update = processor(provider, fetcher)
            .process_row(&record("Example Inc"))
            .await;

        assert_eq!(update.status, Status::Found);
        assert_eq!(update.contact_email, None);
        assert!(update
            .contact_form_url
            .as_deref()
            .unwrap()
            .contains("example.com/contact"));
        assert_eq!(update.source_url, update.contact_form_url);
    }

    #[tokio::test]
    async fn crawled_site_without_contacts_is_not_found() {
        let provider = CannedProvider {
            results: HashMap::from([("Example Inc", vec!["https://example.com/"])]),
            fail_everything: false,
        };
        let fetcher = CannedFetcher {
            pages: HashMap::from([(
                "https://example.com/",
                "<p>Just marketing copy, nothing else.</p>",
            )]),
        };
        let update = processor(provider, fetcher)
            .process_row(&record("Example Inc"))
            .await;

        assert_eq!(update.status, Status::NotFound);
        assert!(!update.last_checked.is_empty());
    }

    #[tokio::test]
    async fn contact_hunt_rescues_empty_site_crawl() {
        // Homepage has nothing, but a site: query surfaces a deep contact
        // page the homepage never linked.
        let provider = CannedProvider {
            results: HashMap::from([
                ("Example Inc", vec!["https://example.com/"]),
                ("site:example.com", vec!["https://example.com/really/deep/contact"]),
            ]),
            fail_everything: false,
        };
        let fetcher = CannedFetcher {
            pages: HashMap::from([
                ("https://example.com/", "<p>minimal landing page</p>"),
                (
                    "https://example.com/really/deep/contact",
                    "<p>info@example.com</p>",
                ),
            ]),
        };
        let update = processor(provider, fetcher)
            .process_row(&record("Example Inc"))
            .await;

        assert_eq!(update.status, Status::Found);
        assert_eq!(update.contact_email.as_deref(), Some("info@example.com"));
        assert_eq!(
            update.source_url.as_deref(),
            Some("https://example.com/really/deep/contact")
        );
    }

    struct CannedSheet {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        failing_rows: Vec<usize>,
        fatal_rows: Vec<usize>,
        written: Arc<Mutex<Vec<(usize, Status)>>>,
    }

    #[async_trait]
    impl SheetStore for CannedSheet {
        async fn read_table(&self) -> crate::error::Result<SheetTable> {
            Ok(SheetTable {
                headers: self.headers.clone(),
                rows: self.rows.clone(),
            })
        }

        async fn write_row_update(
            &self,
            row: usize,
            _index: &HeaderIndex,
            update: &RowUpdate,
        ) -> crate::error::Result<()> {
            if self.fatal_rows.contains(&row) {
                return Err(Error::Auth("token refresh rejected".into()));
            }
            if self.failing_rows.contains(&row) {
                return Err(Error::SheetApi("values.batchUpdate returned 500".into()));
            }
            self.written.lock().unwrap().push((row, update.status));
            Ok(())
        }
    }

    fn sheet_headers() -> Vec<String> {
        REQUIRED_COLUMNS.iter().map(|s| s.to_string()).collect()
    }

    fn pending_row(company: &str) -> Vec<String> {
        let mut row = vec![String::new(); 13];
        row[0] = company.to_string();
        row
    }

    fn found_row(company: &str) -> Vec<String> {
        let mut row = pending_row(company);
        row[3] = "contact@done.example".to_string();
        row[6] = "Found".to_string();
        row
    }

    fn orchestrator(
        rows: Vec<Vec<String>>,
        failing_rows: Vec<usize>,
        fatal_rows: Vec<usize>,
        max_rows: usize,
    ) -> (Orchestrator, Arc<Mutex<Vec<(usize, Status)>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sheet = CannedSheet {
            headers: sheet_headers(),
            rows,
            failing_rows,
            fatal_rows,
            written: written.clone(),
        };
        let provider = CannedProvider {
            results: HashMap::from([("Example Inc", vec!["https://example.com/"])]),
            fail_everything: false,
        };
        let fetcher = CannedFetcher {
            pages: HashMap::from([("https://example.com/", "<p>hello@example.com</p>")]),
        };
        let run = RunConfig {
            max_rows,
            row_delay_ms: 1,
        };
        let app = Orchestrator::new(Box::new(sheet), processor(provider, fetcher), run);
        (app, written)
    }

    #[tokio::test]
    async fn found_rows_are_skipped_without_a_write() {
        let rows = vec![found_row("Done Corp"), pending_row("Example Inc")];
        let (app, written) = orchestrator(rows, vec![], vec![], 100);
        let summary = app.run().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 1);
        // Only sheet row 3 was written; row 2 stays untouched, so its
        // LastChecked never moves on a skip.
        let written = written.lock().unwrap();
        assert_eq!(written.as_slice(), &[(3, Status::Found)]);
    }

    #[tokio::test]
    async fn row_budget_caps_a_run() {
        let rows = vec![pending_row("Example Inc"), pending_row("Example Inc")];
        let (app, written) = orchestrator(rows, vec![], vec![], 1);
        let summary = app.run().await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_counts_an_error_and_the_batch_continues() {
        let rows = vec![pending_row("Example Inc"), pending_row("Example Inc")];
        let (app, written) = orchestrator(rows, vec![2], vec![], 100);
        let summary = app.run().await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.found, 1);
        let written = written.lock().unwrap();
        assert_eq!(written.as_slice(), &[(3, Status::Found)]);
    }

    #[tokio::test]
    async fn fatal_write_error_aborts_the_run() {
        let rows = vec![pending_row("Example Inc"), pending_row("Example Inc")];
        let (app, written) = orchestrator(rows, vec![], vec![2], 100);
        let err = app.run().await.unwrap_err();

        assert!(err.is_fatal());
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn long_diagnostics_are_truncated_for_the_notes_cell() {
        let long = "x".repeat(500);
        let note = truncate_note(&long);
        assert!(note.chars().count() <= 201);
        assert!(note.ends_with('…'));
    }
}
