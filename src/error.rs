use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlError>;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Stale element: {0}")]
    StaleElement(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Forbidden page detected at {0}")]
    Forbidden(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Re-resolve the element by position and repeat the action once.
    RetryOnce,
    LogAndContinue,
    AbortRun,
}

impl CrawlError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CrawlError::StaleElement(_) => RecoveryStrategy::RetryOnce,
            CrawlError::Forbidden(_) => RecoveryStrategy::AbortRun,
            CrawlError::NetworkError(_)
            | CrawlError::BrowserError(_)
            | CrawlError::ElementNotFound(_)
            | CrawlError::Timeout { .. }
            | CrawlError::ParseError(_)
            | CrawlError::StorageError(_)
            | CrawlError::ConfigError(_) => RecoveryStrategy::LogAndContinue,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.recovery_strategy() == RecoveryStrategy::AbortRun
    }
}

// Messages chrome returns when a previously resolved node left the document.
const STALE_NODE_MARKERS: &[&str] = &[
    "no node with given id",
    "could not find node with given id",
    "node is detached",
    "node with given id does not belong to the document",
    "cannot find context with specified id",
    "object reference chain is too long",
];

impl From<std::io::Error> for CrawlError {
    fn from(err: std::io::Error) -> Self {
        CrawlError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        CrawlError::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for CrawlError {
    fn from(err: toml::de::Error) -> Self {
        CrawlError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        CrawlError::NetworkError(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for CrawlError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if STALE_NODE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            CrawlError::StaleElement(message)
        } else {
            CrawlError::BrowserError(message)
        }
    }
}
