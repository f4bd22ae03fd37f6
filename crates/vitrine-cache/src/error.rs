use thiserror::Error;

/// Centralized error type for vitrine-cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend I/O: {0}")]
    Backend(String),

    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("gateway fetch failed: {0}")]
    Fetch(String),

    #[error("gateway returned HTTP {status} for {url}")]
    FetchStatus { status: u16, url: String },

    #[error("size index persistence: {0}")]
    Index(String),
}

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        Self::Fetch(error.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Index(error.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
