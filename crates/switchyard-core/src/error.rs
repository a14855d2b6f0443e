use switchyard_providers::ProviderError;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Classified provider failure, passed through unchanged.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The built-in native provider failed.
    #[error("native provider failed: {0}")]
    Native(String),

    #[error("invalid model identifier '{0}': expected <provider>/<model>")]
    InvalidModel(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl CoreError {
    /// Provider-side failure that fallback may recover from.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, CoreError::Provider(e) if e.is_provider_failure())
    }
}
