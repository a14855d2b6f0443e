//! Provider error types

use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required credential or setting is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider refused the connection (daemon not started, wrong port).
    #[error("{provider} is not running or unreachable at {endpoint}")]
    NotRunning { provider: String, endpoint: String },

    /// Non-2xx status with a parseable error body.
    #[error("{provider} API error ({status}): {message}")]
    ProviderApi {
        provider: String,
        status: u16,
        message: String,
    },

    /// Non-2xx status without a usable error body.
    #[error("{provider} request failed with HTTP status {status}")]
    HttpStatus { provider: String, status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no handler registered for provider: {0}")]
    NotRegistered(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Whether this failure came from the provider side (as opposed to a
    /// local misconfiguration).
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::NotRunning { .. }
                | Self::ProviderApi { .. }
                | Self::HttpStatus { .. }
                | Self::Network(_)
                | Self::InvalidResponse(_)
        )
    }

    /// HTTP status reported by the provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProviderApi { status, .. } | Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
