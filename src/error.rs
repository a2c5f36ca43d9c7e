//! Error types for friend-circle.

use thiserror::Error;

/// Common error type for friend-circle.
///
/// Per-friend fetch failures are not represented here; they are recorded as
/// [`crate::feed::FetchError`] values and never abort a run.
#[derive(Error, Debug)]
pub enum FriendCircleError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error outside of per-friend fetching.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for configuration or input values.
    #[error("validation error: {0}")]
    Validation(String),

    /// The friend manifest could not be fetched or understood.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Mail composition or delivery error.
    #[error("mail error: {0}")]
    Mail(String),

    /// Template error.
    #[error("template error: {0}")]
    Template(#[from] crate::template::TemplateError),
}

impl From<reqwest::Error> for FriendCircleError {
    fn from(e: reqwest::Error) -> Self {
        FriendCircleError::Http(e.to_string())
    }
}

/// Result type alias for friend-circle operations.
pub type Result<T> = std::result::Result<T, FriendCircleError>;
