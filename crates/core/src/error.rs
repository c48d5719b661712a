//! Unified error types for the presence engine.
//!
//! Cancellation is its own variant so every retry loop can tell a clean stop
//! apart from a failure worth retrying.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the presence engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The shared cancellation signal fired.
    #[error("operation canceled")]
    Canceled,

    /// The status endpoint answered with something other than 200.
    #[error("request finished with code {0}")]
    Status(u16),

    #[error("request error: {0}")]
    Request(String),

    #[error("request finished with code {status}: {message}")]
    Decode { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn decode(status: u16, msg: impl Into<String>) -> Self {
        Self::Decode {
            status,
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when this error only reports that cancellation fired.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Serialization(_) => 400,
            Self::Canceled => 503,
            Self::Status(_) | Self::Request(_) | Self::Decode { .. } => 502,
            Self::Storage(_) | Self::Broker(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }
}
