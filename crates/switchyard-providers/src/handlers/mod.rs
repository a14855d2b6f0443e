//! Provider handlers
//!
//! A handler is the adapter for one provider: it transforms the canonical
//! request, performs exactly one outbound HTTP call and transforms the answer
//! back. Retries and fallback are the caller's business.

mod gemini;
mod ollama;
mod openai_compat;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use switchyard_protocol::{CanonicalRequest, CanonicalResponse};

use crate::transform::{finish_stream, StreamAccumulator};
use crate::{HandlerConfig, ProviderError, ProviderKind, ProviderResult};

pub use gemini::GeminiHandler;
pub use ollama::OllamaHandler;
pub use openai_compat::OpenAiCompatibleHandler;

/// Stream of ready-to-send Anthropic SSE frames.
pub type SseStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Timeout for health probes; they must answer quickly or count as down.
pub(crate) const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared capability of every provider handler.
#[async_trait]
pub trait Handler: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Transform, call the provider once, transform back.
    async fn handle(&self, request: &CanonicalRequest) -> ProviderResult<CanonicalResponse>;

    /// Same as [`Handler::handle`] but streams Anthropic SSE frames.
    async fn handle_stream(&self, request: &CanonicalRequest) -> ProviderResult<SseStream>;

    /// Best-effort reachability probe. Never fails; `false` on any error.
    async fn check_health(&self) -> bool;

    /// Fully qualified URL this handler calls, for diagnostics.
    fn endpoint(&self) -> String;
}

/// Build a handler for `config`. One exhaustive match over the provider kind.
pub fn create_handler(config: &HandlerConfig) -> ProviderResult<Arc<dyn Handler>> {
    config.validate()?;
    let handler: Arc<dyn Handler> = match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaHandler::new(config)?),
        ProviderKind::OpenRouter | ProviderKind::OpenAI => {
            Arc::new(OpenAiCompatibleHandler::new(config)?)
        }
        ProviderKind::Gemini => Arc::new(GeminiHandler::new(config)?),
    };
    tracing::debug!(provider = %config.provider, endpoint = %handler.endpoint(), "created handler");
    Ok(handler)
}

/// Feed an upstream SSE body through a line transformer.
///
/// Lines are split on raw bytes so multi-byte characters crossing chunk
/// boundaries survive.
pub(crate) fn sse_stream(
    response: reqwest::Response,
    model: String,
    transform: fn(&str, &mut StreamAccumulator) -> Option<String>,
) -> SseStream {
    let stream = async_stream::try_stream! {
        let mut acc = StreamAccumulator::new(model);
        let mut buffer: Vec<u8> = Vec::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(ProviderError::Network)?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(frame) = transform(&line, &mut acc) {
                    yield frame;
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).into_owned();
            if let Some(frame) = transform(&line, &mut acc) {
                yield frame;
            }
        }

        if let Some(frame) = finish_stream(&mut acc) {
            yield frame;
        }
    };

    Box::pin(stream)
}
