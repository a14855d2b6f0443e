//! Shared utilities for handling API responses across providers

use reqwest::Response;
use serde::Deserialize;
use serde_json::Value;

use crate::{ProviderError, ProviderKind};

/// Classify a transport failure. Refused connections mean the provider is
/// not running; everything else stays a network error.
pub(crate) fn classify_send_error(
    provider: ProviderKind,
    endpoint: &str,
    error: reqwest::Error,
) -> ProviderError {
    if error.is_connect() {
        tracing::warn!(%provider, endpoint, error = %error, "provider unreachable");
        ProviderError::NotRunning {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
        }
    } else {
        tracing::warn!(%provider, endpoint, error = %error, "provider request failed");
        ProviderError::Network(error)
    }
}

/// Turn a non-2xx response into a provider error, carrying the provider's
/// own message when the body has one.
pub(crate) async fn error_from_response(provider: ProviderKind, response: Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%provider, status, body = %body, "provider returned an error status");

    match extract_error_message(&body) {
        Some(message) => ProviderError::ProviderApi {
            provider: provider.to_string(),
            status,
            message,
        },
        None => ProviderError::HttpStatus {
            provider: provider.to_string(),
            status,
        },
    }
}

/// Parse an error message out of a provider error body.
///
/// Understands the common shapes: `{"error": {"message": ...}}` (OpenAI,
/// OpenRouter, Gemini), `{"error": "..."}` (Ollama) and `{"message": ...}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let parsed: ErrorResponse = serde_json::from_str(body).ok()?;
    let message = match parsed.error {
        Some(Value::String(s)) => Some(s),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    message
        .or(parsed.message)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

/// Common error response structure used by many APIs
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}
