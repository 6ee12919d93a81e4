use serde::{Deserialize, Serialize};

/// Exact header names expected in row 1 of the sheet. The last four columns
/// belong to the downstream outreach process; we validate their presence but
/// never write them.
pub const REQUIRED_COLUMNS: [&str; 13] = [
    "Company",
    "Domain",
    "Website",
    "ContactEmail",
    "ContactFormURL",
    "SourceURL",
    "Status",
    "LastChecked",
    "Notes",
    "ReadyToSend",
    "EmailSubject",
    "EmailBody",
    "SentAt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Found,
    NotFound,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Found => "Found",
            Status::NotFound => "NotFound",
            Status::Error => "Error",
        }
    }

    /// Lenient parse for values typed by hand into the sheet. Anything
    /// unrecognised (including blank) is treated as Pending so the row gets
    /// picked up again.
    pub fn from_cell(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "found" | "email_found" | "form_found" | "done" => Status::Found,
            "notfound" | "not_found" | "no_contact" => Status::NotFound,
            "error" => Status::Error,
            _ => Status::Pending,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sheet row as read at the start of a run. `row` is the 1-based sheet
/// row number (data starts at 2).
#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub row: usize,
    pub company: String,
    pub domain_hint: Option<String>,
    pub website: Option<String>,
    pub contact_email: Option<String>,
    pub contact_form_url: Option<String>,
    pub source_url: Option<String>,
    pub status: Status,
    pub last_checked: Option<String>,
    pub notes: Option<String>,
}

impl ContactRecord {
    /// A row needs processing when it names a company and no contact has
    /// been found for it yet. Rows already marked Found are skipped whole,
    /// which keeps re-runs from churning SourceURL or LastChecked.
    pub fn needs_processing(&self) -> bool {
        if self.company.trim().is_empty() {
            return false;
        }
        let has_email = self.contact_email.as_deref().unwrap_or("").trim() != "";
        let has_form = self.contact_form_url.as_deref().unwrap_or("").trim() != "";
        !has_email && !has_form && self.status != Status::Found
    }
}

/// Result of processing one row, written back as individual cells so the
/// outreach columns are never disturbed.
#[derive(Debug, Clone)]
pub struct RowUpdate {
    pub website: Option<String>,
    pub contact_email: Option<String>,
    pub contact_form_url: Option<String>,
    pub source_url: Option<String>,
    pub status: Status,
    pub last_checked: String,
    pub notes: String,
}

impl RowUpdate {
    pub fn error(website: Option<String>, notes: impl Into<String>) -> Self {
        Self {
            website,
            contact_email: None,
            contact_form_url: None,
            source_url: None,
            status: Status::Error,
            last_checked: chrono::Utc::now().to_rfc3339(),
            notes: notes.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(email: &str, form: &str, status: Status) -> ContactRecord {
        ContactRecord {
            row: 2,
            company: "Example Inc".into(),
            domain_hint: None,
            website: None,
            contact_email: if email.is_empty() { None } else { Some(email.into()) },
            contact_form_url: if form.is_empty() { None } else { Some(form.into()) },
            source_url: None,
            status,
            last_checked: None,
            notes: None,
        }
    }

    #[test]
    fn status_cell_parsing_is_lenient() {
        assert_eq!(Status::from_cell("Found"), Status::Found);
        assert_eq!(Status::from_cell("email_found"), Status::Found);
        assert_eq!(Status::from_cell("no_contact"), Status::NotFound);
        assert_eq!(Status::from_cell(""), Status::Pending);
        assert_eq!(Status::from_cell("garbage"), Status::Pending);
    }

    #[test]
    fn pending_row_needs_processing() {
        assert!(record("", "", Status::Pending).needs_processing());
    }

    #[test]
    fn found_row_with_contact_is_skipped() {
        assert!(!record("contact@example.com", "", Status::Found).needs_processing());
        assert!(!record("", "https://example.com/contact", Status::Found).needs_processing());
    }

    #[test]
    fn error_rows_are_retried() {
        assert!(record("", "", Status::Error).needs_processing());
    }

    #[test]
    fn empty_company_is_never_processed() {
        let mut r = record("", "", Status::Pending);
        r.company = "  ".into();
        assert!(!r.needs_processing());
    }
}
