use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for a run. `Config` and `Auth` abort before any row is
/// processed; the rest are recovered at the row boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("service account auth failed: {0}")]
    Auth(String),

    #[error("sheets api error: {0}")]
    SheetApi(String),

    #[error("search provider {provider} failed: {reason}")]
    Search { provider: &'static str, reason: String },

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Fatal errors terminate the whole run; everything else is recorded on
    /// the row and the batch continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Auth(_))
    }
}
