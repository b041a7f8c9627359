//! Error types for registry operations.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while talking to the package registry.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be sent or the response could not be read.
    #[error("Failed to send request to {url}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The registry answered with a client or server error status.
    #[error("{status}: {message}\nurl = {url:?}")]
    Registry {
        status: u16,
        message: String,
        url: String,
    },

    /// The response body did not have the expected shape.
    #[error("Failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Missing credentials or malformed input, detected before any request.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Some deletions of a batch failed while others may have succeeded.
    #[error("{failed} of {total} deletions failed")]
    BatchPartialFailure { failed: usize, total: usize },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
