//! OpenAI-compatible handler (OpenRouter, OpenAI)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use switchyard_protocol::{CanonicalRequest, CanonicalResponse};

use super::{sse_stream, Handler, SseStream, HEALTH_CHECK_TIMEOUT};
use crate::response_handling::{classify_send_error, error_from_response};
use crate::transform::{openai, transform_openai_stream_line};
use crate::{HandlerConfig, ProviderError, ProviderKind, ProviderResult};

/// Identifies this application to OpenRouter's app rankings.
const ATTRIBUTION_REFERER: &str = "https://github.com/junhoyeo/switchyard";
const ATTRIBUTION_TITLE: &str = "Switchyard";

/// Remote, key-authenticated provider speaking `chat/completions`.
pub struct OpenAiCompatibleHandler {
    client: Client,
    provider: ProviderKind,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiCompatibleHandler {
    pub fn new(config: &HandlerConfig) -> ProviderResult<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            ProviderError::Configuration(format!("API key required for {}", config.provider))
        })?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.resolved_base_url(),
            api_key: SecretString::from(api_key.to_string()),
        })
    }

    /// Headers sent with every request: bearer auth, JSON content type and
    /// app attribution.
    pub fn headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret()))
            .map_err(|_| ProviderError::Configuration("Invalid API key format".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("HTTP-Referer", HeaderValue::from_static(ATTRIBUTION_REFERER));
        headers.insert("X-Title", HeaderValue::from_static(ATTRIBUTION_TITLE));
        Ok(headers)
    }

    async fn send(&self, request: &CanonicalRequest, stream: bool) -> ProviderResult<reqwest::Response> {
        let mut body = openai::to_provider_format(request)?;
        body.stream = stream;
        if !stream {
            body.stream_options = None;
        }
        send_chat(&self.client, self.provider, &self.endpoint(), self.headers()?, &body).await
    }
}

/// POST a chat-completions body once and classify failures.
pub(crate) async fn send_chat(
    client: &Client,
    provider: ProviderKind,
    url: &str,
    headers: HeaderMap,
    body: &openai::ChatCompletionRequest,
) -> ProviderResult<reqwest::Response> {
    tracing::debug!(%provider, url, model = %body.model, stream = body.stream, "dispatching chat completion");

    let response = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| classify_send_error(provider, url, e))?;

    if !response.status().is_success() {
        return Err(error_from_response(provider, response).await);
    }
    Ok(response)
}

/// Decode a non-streaming chat-completions body into a canonical response.
pub(crate) async fn read_chat_response(
    response: reqwest::Response,
    requested_model: &str,
) -> ProviderResult<CanonicalResponse> {
    let text = response.text().await?;
    let parsed: openai::ChatCompletionResponse = serde_json::from_str(&text)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed chat completion: {}", e)))?;
    openai::from_provider_format(parsed, requested_model)
}

#[async_trait]
impl Handler for OpenAiCompatibleHandler {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    async fn handle(&self, request: &CanonicalRequest) -> ProviderResult<CanonicalResponse> {
        let response = self.send(request, false).await?;
        read_chat_response(response, &request.model).await
    }

    async fn handle_stream(&self, request: &CanonicalRequest) -> ProviderResult<SseStream> {
        let response = self.send(request, true).await?;
        Ok(sse_stream(
            response,
            request.model.clone(),
            transform_openai_stream_line,
        ))
    }

    async fn check_health(&self) -> bool {
        let Ok(headers) = self.headers() else {
            return false;
        };
        match self
            .client
            .get(format!("{}/models", self.base_url))
            .headers(headers)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.provider, error = %e, "health check failed");
                false
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_auth_content_type_and_attribution() {
        let handler = OpenAiCompatibleHandler::new(&HandlerConfig::openrouter("sk-or-123")).unwrap();
        let headers = handler.headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-or-123");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get("X-Title").unwrap(), ATTRIBUTION_TITLE);
        assert!(headers.get("HTTP-Referer").is_some());
    }

    #[test]
    fn openai_uses_its_own_base_url() {
        let handler = OpenAiCompatibleHandler::new(&HandlerConfig::openai("sk-1")).unwrap();
        assert_eq!(handler.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
