//! Error types for the reqwest-resilient crate.

use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a top-level request.
///
/// Everything below this level (network errors, blocked statuses, an empty
/// proxy pool) is absorbed by the retry loop and never reaches the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No response with status 200 was obtained within the retry budget.
    #[error("failed to fetch {url} after {attempts} attempts")]
    Exhausted { url: String, attempts: u32 },
    /// The caller's cancellation future resolved before the request finished.
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    /// The URL the failed request targeted.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Exhausted { url, .. } | FetchError::Cancelled { url } => url,
        }
    }
}

/// Reason a single transport attempt produced no usable response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Client(#[from] reqwest::Error),
    #[error("invalid proxy {proxy}: {source}")]
    InvalidProxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// Error loading a proxy or user-agent list.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error returned when a fetcher configuration is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_retries must be at least 1")]
    ZeroRetries,
    #[error("backoff factor must be finite and non-negative, got {0}")]
    InvalidBackoff(f64),
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("invalid default header {0:?}")]
    InvalidHeader(String),
}
