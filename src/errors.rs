use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INVALID_PATH: {0}")]
    InvalidPath(String),
    #[error("STORAGE_FAULT: {0}")]
    Storage(String),
    #[error("UPSTREAM_HTTP: VAULT_0 API error {status} on {route}: {body}")]
    UpstreamHttp { route: String, status: u16, body: String },
    #[error("UPSTREAM_TIMEOUT: VAULT_0 API timeout after {timeout_ms}ms on {route}")]
    UpstreamTimeout { route: String, timeout_ms: u64 },
    #[error("UPSTREAM_UNKNOWN: VAULT_0 API request failed on {route}: {message}")]
    UpstreamUnknown {
        route: String,
        message: String,
        retryable: bool,
    },
    #[error("CANCELLED: {0}")]
    Cancelled(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the bridge retry loop may attempt the request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamHttp { status, .. } => *status >= 500,
            Self::UpstreamTimeout { .. } => true,
            Self::UpstreamUnknown { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
