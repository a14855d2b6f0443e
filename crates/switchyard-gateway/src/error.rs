use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::net::SocketAddr;
use switchyard_core::CoreError;
use switchyard_providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("gateway already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("gateway is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl GatewayError {
    /// HTTP status, Anthropic error type and client-facing message.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            GatewayError::MalformedRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", msg.clone())
            }
            GatewayError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "request_too_large", self.to_string())
            }
            GatewayError::AlreadyRunning(_) => {
                (StatusCode::CONFLICT, "invalid_request_error", self.to_string())
            }
            GatewayError::Timeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "timeout_error", self.to_string())
            }
            GatewayError::ShuttingDown => {
                (StatusCode::SERVICE_UNAVAILABLE, "overloaded_error", self.to_string())
            }
            GatewayError::Core(CoreError::InvalidModel(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", self.to_string())
            }
            GatewayError::Core(CoreError::Provider(e)) => provider_parts(e),
            GatewayError::Core(CoreError::Native(_)) => {
                (StatusCode::BAD_GATEWAY, "api_error", "native provider failed".to_string())
            }
            GatewayError::Bind { .. }
            | GatewayError::Config(_)
            | GatewayError::Core(CoreError::Config(_))
            | GatewayError::Core(CoreError::Storage(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                "internal error".to_string(),
            ),
        }
    }
}

fn provider_parts(error: &ProviderError) -> (StatusCode, &'static str, String) {
    match error {
        // Provider messages are meant to be actionable; pass them through.
        ProviderError::ProviderApi { .. } => {
            (StatusCode::BAD_GATEWAY, "api_error", error.to_string())
        }
        ProviderError::NotRunning { provider, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "api_error",
            format!("{} is not running", provider),
        ),
        ProviderError::UnknownProvider(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request_error", error.to_string())
        }
        ProviderError::HttpStatus { provider, status } => (
            StatusCode::BAD_GATEWAY,
            "api_error",
            format!("{} returned HTTP {}", provider, status),
        ),
        ProviderError::Network(_)
        | ProviderError::InvalidResponse(_)
        | ProviderError::Serialization(_) => (
            StatusCode::BAD_GATEWAY,
            "api_error",
            "upstream provider error".to_string(),
        ),
        ProviderError::Configuration(_) | ProviderError::NotRegistered(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "api_error",
            "provider is not configured".to_string(),
        ),
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = json!({
            "type": "error",
            "error": { "type": kind, "message": message },
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: GatewayError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(GatewayError::MalformedRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(GatewayError::PayloadTooLarge { limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_of(GatewayError::Core(CoreError::InvalidModel("gpt".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(GatewayError::Core(CoreError::Provider(ProviderError::NotRunning {
                provider: "ollama".into(),
                endpoint: "http://localhost:11434".into(),
            }))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_provider_api_message_passes_through() {
        let error = GatewayError::Core(CoreError::Provider(ProviderError::ProviderApi {
            provider: "openrouter".into(),
            status: 402,
            message: "Insufficient credits".into(),
        }));
        let (status, _, message) = error.parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(message.contains("Insufficient credits"));
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let error = GatewayError::Core(CoreError::Config("/home/me/.config secret path".into()));
        let (status, _, message) = error.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "internal error");
    }
}
