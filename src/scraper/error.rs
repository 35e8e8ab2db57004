use thiserror::Error;

/// Failure of a single upstream fetch. Always recoverable at the chain level.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("source '{source_name}' timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid CSV payload: {0}")]
    Csv(#[from] csv::Error),

    #[error("bad URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported payload: {0}")]
    Payload(String),

    #[error("no usable data: {0}")]
    NoData(String),
}

impl FetchError {
    /// Network hiccups, rate limiting and server errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(e) => !e.is_builder() && !e.is_decode(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn no_data(msg: impl Into<String>) -> Self {
        Self::NoData(msg.into())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
