use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to a remote service (search API or LLM backend).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote asked us to slow down (HTTP 429) or is overloaded (HTTP 503).
    #[error("rate limited (status {status})")]
    RateLimited { status: u16 },

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::RateLimited { .. })
    }

    /// Map an unsuccessful HTTP status to the right variant.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 429 || status == 503 {
            TransportError::RateLimited { status }
        } else {
            TransportError::Other(format!("HTTP {status}: {body}"))
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransportError::from_status(status.as_u16(), &err.to_string()),
            None => TransportError::Other(err.to_string()),
        }
    }
}

/// Why a single paper could not be analyzed.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("schema error: {0}")]
    Schema(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key not found. Set {env} environment variable.")]
    MissingCredential { env: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid backend url {url}: {reason}")]
    BadUrl { url: String, reason: String },

    #[error("API key is not a valid header value ({0})")]
    InvalidCredential(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt daily record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize daily record: {0}")]
    Serialize(#[from] serde_json::Error),
}
