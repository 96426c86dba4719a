//! Error taxonomy shared by the pipeline layers
//!
//! - [`SourceError`]: fetching or reading one upstream page
//! - [`StoreError`]: catalog persistence, fatal for a run
//! - [`NotifyError`]: one notification delivery, never fatal

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Unexpected payload from {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl SourceError {
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(context: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            context: context.to_string(),
            message: message.into(),
        }
    }

    /// Transient failures are worth another attempt; malformed payloads are not.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::HttpStatus { .. } => true,
            Self::Parse { .. } | Self::InvalidSelector { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid table name '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidTableName(String),

    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("No notification endpoint configured")]
    NoEndpoints,

    #[error("Delivery to {endpoint} failed: {message}")]
    Delivery { endpoint: String, message: String },

    #[error("All {attempted} notification endpoints failed, last error: {last_error}")]
    AllEndpointsFailed { attempted: usize, last_error: String },
}

pub type SourceResult<T> = Result<T, SourceError>;
pub type StoreResult<T> = Result<T, StoreError>;
