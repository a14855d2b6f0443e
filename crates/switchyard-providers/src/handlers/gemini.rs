//! Google Gemini handler

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use switchyard_protocol::{CanonicalRequest, CanonicalResponse};

use super::{sse_stream, Handler, SseStream, HEALTH_CHECK_TIMEOUT};
use crate::response_handling::{classify_send_error, error_from_response};
use crate::transform::gemini::{self, transform_gemini_stream_line, GenerateContentResponse};
use crate::{HandlerConfig, ProviderError, ProviderKind, ProviderResult};

pub struct GeminiHandler {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl GeminiHandler {
    pub fn new(config: &HandlerConfig) -> ProviderResult<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            ProviderError::Configuration(format!("API key required for {}", config.provider))
        })?;
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            api_key: SecretString::from(api_key.to_string()),
        })
    }

    fn headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(self.api_key.expose_secret())
            .map_err(|_| ProviderError::Configuration("Invalid API key format".into()))?;
        headers.insert("x-goog-api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// `models/gemini-2.0-flash` and `gemini-2.0-flash` address the same model.
    fn model_url(&self, model: &str, stream: bool) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        if stream {
            format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model
            )
        } else {
            format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
        }
    }

    async fn send(&self, request: &CanonicalRequest, stream: bool) -> ProviderResult<reqwest::Response> {
        let body = gemini::to_provider_format(request)?;
        let url = self.model_url(&request.model, stream);
        tracing::debug!(model = %request.model, stream, "dispatching gemini request");

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(ProviderKind::Gemini, &url, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(ProviderKind::Gemini, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl Handler for GeminiHandler {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn handle(&self, request: &CanonicalRequest) -> ProviderResult<CanonicalResponse> {
        let response = self.send(request, false).await?;
        let text = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::InvalidResponse(format!("malformed generateContent response: {}", e))
        })?;
        gemini::from_provider_format(parsed, &request.model)
    }

    async fn handle_stream(&self, request: &CanonicalRequest) -> ProviderResult<SseStream> {
        let response = self.send(request, true).await?;
        Ok(sse_stream(
            response,
            request.model.clone(),
            transform_gemini_stream_line,
        ))
    }

    async fn check_health(&self) -> bool {
        let Ok(headers) = self.headers() else {
            return false;
        };
        self.client
            .get(format!("{}/v1beta/models", self.base_url))
            .headers(headers)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// URL template of the completion call; `{model}` is filled per request.
    fn endpoint(&self) -> String {
        self.model_url("{model}", false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_urls() {
        let handler = GeminiHandler::new(
            &HandlerConfig::gemini("g").with_base_url("http://127.0.0.1:9000"),
        )
        .unwrap();
        assert_eq!(
            handler.model_url("models/gemini-2.0-flash", false),
            "http://127.0.0.1:9000/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            handler.model_url("gemini-2.0-flash", true),
            "http://127.0.0.1:9000/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            handler.endpoint(),
            "http://127.0.0.1:9000/v1beta/models/{model}:generateContent"
        );
    }
}
