use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;

pub use http::{HttpMethod, RequestSpec, ResponseView};

/// Base URL used when neither `--base-url` nor `BASE_URL` is provided.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Error types for Surge operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurgeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Check failed: {0}")]
    CheckFailed(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Target concurrency {requested} exceeds worker cap {cap}")]
    CapacityExceeded { requested: u32, cap: u32 },

    #[error("Invalid elapsed time: {0}")]
    InvalidTime(String),
}

impl SurgeError {
    /// `true` for failures that happened before a response was obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, SurgeError::NetworkError(_) | SurgeError::Timeout(_))
    }

    pub fn config(message: impl Into<String>) -> Self {
        SurgeError::Configuration(message.into())
    }
}

/// JSON error envelope returned by the reference target for all error responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Result type for Surge operations
pub type Result<T> = std::result::Result<T, SurgeError>;
