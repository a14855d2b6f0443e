//! Ollama handler
//!
//! Ollama exposes an OpenAI-compatible `/v1/chat/completions` endpoint, so
//! requests reuse the OpenAI transformer. Model listing and health checks go
//! through the native `/api/tags` endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use switchyard_protocol::{CanonicalRequest, CanonicalResponse};

use super::openai_compat::{read_chat_response, send_chat};
use super::{sse_stream, Handler, SseStream, HEALTH_CHECK_TIMEOUT};
use crate::response_handling::{classify_send_error, error_from_response};
use crate::transform::{openai, transform_openai_stream_line};
use crate::{HandlerConfig, ProviderKind, ProviderResult};

/// Local Ollama daemon.
pub struct OllamaHandler {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

impl OllamaHandler {
    pub fn new(config: &HandlerConfig) -> ProviderResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
        })
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    /// Names of the models installed locally.
    pub async fn list_models(&self) -> ProviderResult<Vec<String>> {
        let url = self.tags_url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_send_error(ProviderKind::Ollama, &url, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(ProviderKind::Ollama, response).await);
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn send(&self, request: &CanonicalRequest, stream: bool) -> ProviderResult<reqwest::Response> {
        let mut body = openai::to_provider_format(request)?;
        body.stream = stream;
        if !stream {
            body.stream_options = None;
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        send_chat(&self.client, ProviderKind::Ollama, &self.endpoint(), headers, &body).await
    }
}

#[async_trait]
impl Handler for OllamaHandler {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Ollama
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
        match self
            .client
            .get(self.tags_url())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_base_url_is_trimmed() {
        let handler =
            OllamaHandler::new(&HandlerConfig::ollama().with_base_url("http://gpu-box:11434/")).unwrap();
        assert_eq!(handler.endpoint(), "http://gpu-box:11434/v1/chat/completions");
        assert_eq!(handler.tags_url(), "http://gpu-box:11434/api/tags");
    }
}
