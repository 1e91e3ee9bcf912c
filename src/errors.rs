use std::io;

use thiserror::Error;

/// Error type for search requests, checkpoint persistence, and configuration.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("transient search failure: {reason}")]
    Transient { reason: String },
    #[error("search service rejected the request (code {code}): {message}")]
    Api { code: String, message: String },
    #[error("checkpoint is unreadable: {reason}")]
    CorruptCheckpoint { reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CrawlError {
    /// Whether the failure is worth retrying under the backoff policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, CrawlError::Transient { .. })
    }
}
