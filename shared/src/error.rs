//! Error types for the container lookup Lambda.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving a container lookup.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// SharePoint answered with a non-success status
    #[error("SharePoint error ({status}): {message}")]
    SharePoint { status: u16, message: String },

    /// Transport error talking to SharePoint or the token service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Auth(_) => 401,
            Error::SharePoint { .. } | Error::Http(_) => 502,
            _ => 500,
        }
    }
}
