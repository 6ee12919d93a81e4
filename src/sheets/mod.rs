// Google Sheets v4 values API wrapper. Reads the whole tab once per run and
// writes results back one cell range per column, so the outreach columns
// (ReadyToSend..SentAt) are never touched.
mod auth;

pub use auth::TokenProvider;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::models::{ContactRecord, RowUpdate, Status, REQUIRED_COLUMNS};

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// The raw grid: `headers` is row 1, `rows` everything below it. Sheet row
/// number for `rows[i]` is `i + 2`.
#[derive(Debug)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Column positions of the fields this tool reads and writes, resolved from
/// the header row. Construction fails fast when any required column is
/// missing, before any row is processed.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    pub company: usize,
    pub domain: usize,
    pub website: usize,
    pub contact_email: usize,
    pub contact_form_url: usize,
    pub source_url: usize,
    pub status: usize,
    pub last_checked: usize,
    pub notes: usize,
}

impl HeaderIndex {
    pub fn from_headers(headers: &[String]) -> Result<Self> {
        let position = |name: &str| -> Option<usize> {
            headers.iter().position(|h| h.trim() == name)
        };

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| position(name).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "sheet is missing required column(s): {}",
                missing.join(", ")
            )));
        }

        // All positions exist past this point.
        Ok(Self {
            company: position("Company").unwrap(),
            domain: position("Domain").unwrap(),
            website: position("Website").unwrap(),
            contact_email: position("ContactEmail").unwrap(),
            contact_form_url: position("ContactFormURL").unwrap(),
            source_url: position("SourceURL").unwrap(),
            status: position("Status").unwrap(),
            last_checked: position("LastChecked").unwrap(),
            notes: position("Notes").unwrap(),
        })
    }
}

/// Build a [`ContactRecord`] from one data row. Short rows are padded with
/// empties, matching how the Sheets API trims trailing blank cells.
pub fn record_from_row(index: &HeaderIndex, row_number: usize, row: &[String]) -> ContactRecord {
    let cell = |idx: usize| -> String {
        row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default()
    };
    let opt = |idx: usize| -> Option<String> {
        let v = cell(idx);
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    };

    ContactRecord {
        row: row_number,
        company: cell(index.company),
        domain_hint: opt(index.domain),
        website: opt(index.website),
        contact_email: opt(index.contact_email),
        contact_form_url: opt(index.contact_form_url),
        source_url: opt(index.source_url),
        status: Status::from_cell(&cell(index.status)),
        last_checked: opt(index.last_checked),
        notes: opt(index.notes),
    }
}

/// API URL with every segment percent-encoded, so tab names with spaces or
/// slashes survive the path. Literal segments like `values:batchUpdate` are
/// unaffected (`:` is a valid path character).
fn sheets_url(segments: &[&str]) -> Result<String> {
    let mut url = Url::parse(SHEETS_BASE)
        .map_err(|e| Error::SheetApi(format!("bad API base URL: {}", e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::SheetApi("API base URL cannot hold a path".to_string()))?;
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url.to_string())
}

/// A1 reference for a single cell, with embedded quotes in the tab name
/// doubled per A1 quoting rules.
fn a1_cell(tab: &str, col: usize, row: usize) -> String {
    format!("'{}'!{}{}", tab.replace('\'', "''"), column_letter(col), row)
}

/// 0-based column index to A1 letters (0 -> A, 25 -> Z, 26 -> AA).
pub fn column_letter(mut idx: usize) -> String {
    let mut letters = String::new();
    loop {
        letters.insert(0, (b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Read/write surface of the spreadsheet. A trait so the orchestrator can be
/// driven against a canned table in tests, the same way [`PageFetcher`]
/// stands in for the network.
///
/// [`PageFetcher`]: crate::crawler::PageFetcher
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Read the entire tab, header row included.
    async fn read_table(&self) -> Result<SheetTable>;

    /// Write one row's results. Optional fields that were not produced this
    /// run are left alone so an earlier value is never clobbered with an
    /// empty cell.
    async fn write_row_update(&self, row: usize, index: &HeaderIndex, update: &RowUpdate)
        -> Result<()>;
}

pub struct SheetClient {
    client: Client,
    tokens: TokenProvider,
    sheet_id: String,
    tab: String,
}

impl SheetClient {
    pub fn new(client: Client, tokens: TokenProvider, sheet_id: String, tab: String) -> Self {
        Self {
            client,
            tokens,
            sheet_id,
            tab,
        }
    }
}

#[async_trait]
impl SheetStore for SheetClient {
    async fn read_table(&self) -> Result<SheetTable> {
        let token = self.tokens.access_token().await?;
        let url = sheets_url(&[&self.sheet_id, "values", &self.tab])?;
        debug!(%url, "reading sheet values");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SheetApi(format!(
                "values.get returned {}: {}",
                status, body
            )));
        }

        let mut values = response.json::<ValuesResponse>().await?.values;
        if values.is_empty() {
            return Err(Error::config(
                "sheet has no header row; expected the 13 standard columns in row 1",
            ));
        }
        let headers = values.remove(0);
        info!(rows = values.len(), "sheet loaded");
        Ok(SheetTable {
            headers,
            rows: values,
        })
    }

    async fn write_row_update(
        &self,
        row: usize,
        index: &HeaderIndex,
        update: &RowUpdate,
    ) -> Result<()> {
        let mut data = Vec::new();
        let mut set = |col: usize, value: &str| {
            data.push(json!({
                "range": a1_cell(&self.tab, col, row),
                "values": [[value]],
            }));
        };

        if let Some(website) = &update.website {
            set(index.website, website);
        }
        if let Some(email) = &update.contact_email {
            set(index.contact_email, email);
        }
        if let Some(form) = &update.contact_form_url {
            set(index.contact_form_url, form);
        }
        if let Some(source) = &update.source_url {
            set(index.source_url, source);
        }
        set(index.status, update.status.as_str());
        set(index.last_checked, &update.last_checked);
        set(index.notes, &update.notes);

        let token = self.tokens.access_token().await?;
        let url = sheets_url(&[&self.sheet_id, "values:batchUpdate"])?;
        let body = json!({
            "valueInputOption": "RAW",
            "data": data,
        });

        debug!(row, ranges = body["data"].as_array().map(|d| d.len()).unwrap_or(0), "writing row update");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::SheetApi(format!(
                "values.batchUpdate for row {} returned {}: {}",
                row, status, text
            )));
        }
        Ok(())
    }
}
