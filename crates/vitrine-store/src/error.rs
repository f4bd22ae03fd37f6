use thiserror::Error;

/// Centralized error type for vitrine-store.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("HTTP {status} for URL: {url}")]
    Status { status: u16, url: String },

    #[error("request failed: {0}")]
    Http(String),

    #[error("invalid object reference: {0}")]
    InvalidRef(String),
}

impl StoreError {
    /// True for errors that mean "the object does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
