//! Model execution
//!
//! Routes one completion to either the native provider or a proxied
//! provider handler, with an optional single fallback hop to the native
//! provider when the proxied call fails.

use futures::StreamExt;
use std::sync::Arc;
use switchyard_protocol::{
    CanonicalRequest, CanonicalResponse, ContentBlock, ContentDelta, DeltaUsage, Message,
    MessageDelta, StopReason, StreamEvent, StreamMessageStart, Usage,
};
use switchyard_providers::{HandlerRegistry, ProviderKind, SseStream};

use crate::cost_tracker::{CostTracker, UsageRecord};
use crate::credentials::Credentials;
use crate::model_registry::NATIVE_MODEL_IDS;
use crate::native::{NativeProvider, NATIVE_PROVIDER};
use crate::{CoreError, CoreResult};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Invoked once per fallback with a human-readable explanation.
pub type FallbackCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Where a model identifier is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Native,
    Proxy {
        provider: ProviderKind,
        /// Model path with the provider prefix stripped.
        model: String,
    },
}

/// `default` and `claude` are native; everything else is
/// `<provider>/<model-path>`.
pub fn parse_model(model: &str) -> CoreResult<Route> {
    let model = model.trim();
    if NATIVE_MODEL_IDS.contains(&model) {
        return Ok(Route::Native);
    }
    let (provider, path) = model
        .split_once('/')
        .filter(|(p, m)| !p.is_empty() && !m.is_empty())
        .ok_or_else(|| CoreError::InvalidModel(model.to_string()))?;
    Ok(Route::Proxy {
        provider: provider.parse()?,
        model: path.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub model: String,
    pub fallback_enabled: bool,
    /// Attributed in usage records.
    pub command: Option<String>,
}

impl ExecuteRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            fallback_enabled: false,
            command: None,
        }
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteResult {
    pub content: String,
    pub provider: String,
    pub fallback_used: bool,
    pub usage: Usage,
}

/// A canonical response plus who served it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: CanonicalResponse,
    pub provider: String,
    pub fallback_used: bool,
}

pub struct StreamCompletion {
    pub stream: SseStream,
    pub provider: String,
    pub fallback_used: bool,
}

pub struct ModelExecutor {
    handlers: Arc<HandlerRegistry>,
    credentials: Credentials,
    native: Arc<dyn NativeProvider>,
    cost_tracker: Option<Arc<CostTracker>>,
    on_fallback: Option<FallbackCallback>,
}

impl ModelExecutor {
    pub fn new(native: Arc<dyn NativeProvider>) -> Self {
        Self {
            handlers: Arc::new(HandlerRegistry::new()),
            credentials: Credentials::default(),
            native,
            cost_tracker: None,
            on_fallback: None,
        }
    }

    pub fn with_handler_registry(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_cost_tracker(mut self, tracker: Arc<CostTracker>) -> Self {
        self.cost_tracker = Some(tracker);
        self
    }

    pub fn on_fallback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_fallback = Some(Arc::new(callback));
        self
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// Run a plain prompt against `model`.
    pub async fn execute(&self, request: ExecuteRequest) -> CoreResult<ExecuteResult> {
        let canonical = CanonicalRequest::new(
            request.model.clone(),
            vec![Message::user(request.prompt)],
            DEFAULT_MAX_TOKENS,
        );
        let command = request.command.as_deref().unwrap_or("execute");
        let completion = self
            .run(canonical, request.fallback_enabled, command)
            .await?;

        Ok(ExecuteResult {
            content: completion.response.text(),
            provider: completion.provider,
            fallback_used: completion.fallback_used,
            usage: completion.response.usage,
        })
    }

    /// Run a full canonical request. The response keeps the caller's
    /// model id.
    pub async fn complete(
        &self,
        request: CanonicalRequest,
        fallback_enabled: bool,
    ) -> CoreResult<Completion> {
        self.run(request, fallback_enabled, "messages").await
    }

    async fn run(
        &self,
        mut request: CanonicalRequest,
        fallback_enabled: bool,
        command: &str,
    ) -> CoreResult<Completion> {
        let requested_model = request.model.clone();

        let (mut completion, billed_model) = match parse_model(&requested_model)? {
            Route::Native => (self.complete_native(&request, false).await?, NATIVE_PROVIDER.to_string()),
            Route::Proxy { provider, model } => {
                request.model = model;
                match self.dispatch(provider, &request).await {
                    Ok(response) => (
                        Completion {
                            response,
                            provider: provider.to_string(),
                            fallback_used: false,
                        },
                        requested_model.clone(),
                    ),
                    Err(e) if fallback_enabled && e.is_provider_failure() => {
                        self.notify_fallback(provider, &e);
                        (self.complete_native(&request, true).await?, NATIVE_PROVIDER.to_string())
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        completion.response.model = requested_model;
        self.record(command, &billed_model, completion.response.usage);
        Ok(completion)
    }

    /// Streaming variant of [`ModelExecutor::complete`]. Fallback only
    /// covers failures before the first frame.
    pub async fn stream(
        &self,
        mut request: CanonicalRequest,
        fallback_enabled: bool,
    ) -> CoreResult<StreamCompletion> {
        let requested_model = request.model.clone();
        match parse_model(&requested_model)? {
            Route::Native => self.stream_native(&request, &requested_model, false).await,
            Route::Proxy { provider, model } => {
                request.model = model;
                request.stream = true;
                let result = match self.handler_for(provider) {
                    Ok(handler) => handler.handle_stream(&request).await.map_err(CoreError::from),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(stream) => Ok(StreamCompletion {
                        stream: self.track_stream_usage(stream, requested_model),
                        provider: provider.to_string(),
                        fallback_used: false,
                    }),
                    Err(e) if fallback_enabled && e.is_provider_failure() => {
                        self.notify_fallback(provider, &e);
                        self.stream_native(&request, &requested_model, true).await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn handler_for(
        &self,
        provider: ProviderKind,
    ) -> CoreResult<Arc<dyn switchyard_providers::Handler>> {
        let config = self.credentials.handler_config(provider);
        Ok(self.handlers.get_or_create(&config)?)
    }

    async fn dispatch(
        &self,
        provider: ProviderKind,
        request: &CanonicalRequest,
    ) -> CoreResult<CanonicalResponse> {
        let handler = self.handler_for(provider)?;
        tracing::debug!(%provider, model = %request.model, endpoint = %handler.endpoint(), "dispatching");
        Ok(handler.handle(request).await?)
    }

    async fn complete_native(
        &self,
        request: &CanonicalRequest,
        fallback_used: bool,
    ) -> CoreResult<Completion> {
        let prompt = request.to_prompt_text();
        let text = self.native.complete(&prompt).await?;
        let usage = Usage {
            input_tokens: estimate_tokens(&prompt),
            output_tokens: estimate_tokens(&text),
        };
        Ok(Completion {
            response: CanonicalResponse::new(
                NATIVE_PROVIDER,
                vec![ContentBlock::text(text)],
                StopReason::EndTurn,
                usage,
            ),
            provider: NATIVE_PROVIDER.to_string(),
            fallback_used,
        })
    }

    async fn stream_native(
        &self,
        request: &CanonicalRequest,
        requested_model: &str,
        fallback_used: bool,
    ) -> CoreResult<StreamCompletion> {
        let mut completion = self.complete_native(request, fallback_used).await?;
        completion.response.model = requested_model.to_string();
        self.record("messages", NATIVE_PROVIDER, completion.response.usage);

        let frames = response_as_frames(&completion.response);
        Ok(StreamCompletion {
            stream: Box::pin(futures::stream::once(async move { Ok(frames) })),
            provider: completion.provider,
            fallback_used,
        })
    }

    fn notify_fallback(&self, provider: ProviderKind, error: &CoreError) {
        let message = format!("{} failed ({}), falling back to Claude", provider, error);
        tracing::warn!(%provider, error = %error, "provider failed, falling back to native provider");
        if let Some(callback) = &self.on_fallback {
            callback(&message);
        }
    }

    fn record(&self, command: &str, model: &str, usage: Usage) {
        if let Some(tracker) = &self.cost_tracker {
            tracker.record_usage(UsageRecord::new(
                command,
                model,
                u64::from(usage.input_tokens),
                u64::from(usage.output_tokens),
            ));
        }
    }

    /// Pass frames through untouched and record usage once `message_stop`
    /// goes by, or when the stream is dropped before that.
    fn track_stream_usage(&self, stream: SseStream, model: String) -> SseStream {
        let Some(tracker) = self.cost_tracker.clone() else {
            return stream;
        };
        let mut recorder = StreamUsageRecorder {
            tracker,
            model,
            usage: Usage::default(),
            recorded: false,
        };
        Box::pin(stream.inspect(move |frame| {
            if let Ok(frame) = frame {
                recorder.observe(frame);
            }
        }))
    }
}

/// Usage seen on a proxied stream. Records exactly once.
struct StreamUsageRecorder {
    tracker: Arc<CostTracker>,
    model: String,
    usage: Usage,
    recorded: bool,
}

impl StreamUsageRecorder {
    fn observe(&mut self, frame: &str) {
        for event in parse_frame_events(frame) {
            match event {
                StreamEvent::MessageStart { message } => {
                    self.usage.input_tokens = message.usage.input_tokens;
                }
                StreamEvent::MessageDelta { usage, .. } => {
                    if let Some(input_tokens) = usage.input_tokens {
                        self.usage.input_tokens = input_tokens;
                    }
                    self.usage.output_tokens = usage.output_tokens;
                }
                StreamEvent::MessageStop => self.record(),
                _ => {}
            }
        }
    }

    fn record(&mut self) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        self.tracker.record_usage(UsageRecord::new(
            "messages",
            self.model.clone(),
            u64::from(self.usage.input_tokens),
            u64::from(self.usage.output_tokens),
        ));
    }
}

impl Drop for StreamUsageRecorder {
    fn drop(&mut self) {
        if !self.recorded {
            tracing::debug!(model = %self.model, "stream dropped before message_stop, recording partial usage");
            self.record();
        }
    }
}

fn parse_frame_events(frame: &str) -> Vec<StreamEvent> {
    frame
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}

/// Replay a finished response as a complete Anthropic event stream.
fn response_as_frames(response: &CanonicalResponse) -> String {
    let mut start = StreamMessageStart::new(response.id.clone(), response.model.clone());
    start.usage.input_tokens = response.usage.input_tokens;

    let mut events = vec![StreamEvent::MessageStart { message: start }];
    for (index, block) in response.content.iter().enumerate() {
        if let ContentBlock::Text { text } = block {
            events.push(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::text(""),
            });
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::TextDelta { text: text.clone() },
            });
            events.push(StreamEvent::ContentBlockStop { index });
        }
    }
    events.push(StreamEvent::MessageDelta {
        delta: MessageDelta {
            stop_reason: response.stop_reason,
            stop_sequence: None,
        },
        usage: DeltaUsage::from(response.usage),
    });
    events.push(StreamEvent::MessageStop);

    events.iter().map(StreamEvent::to_sse_frame).collect()
}

/// Rough token estimate for text without a tokenizer (~4 chars per token).
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as f64 / 4.0).ceil() as u32
}
