//! Anthropic <-> OpenAI chat-completions translation.
//!
//! - Anthropic `/v1/messages` request -> OpenAI `chat/completions` request
//! - OpenAI `chat/completions` response -> Anthropic `/v1/messages` response

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use switchyard_protocol::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Role, StopReason, Usage,
};

use crate::{ProviderError, ProviderResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: ChatFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

/// Convert an Anthropic Messages request into an OpenAI `chat/completions`
/// request.
///
/// `metadata` and any other Anthropic-only field is dropped.
pub fn to_provider_format(req: &CanonicalRequest) -> ProviderResult<ChatCompletionRequest> {
    let mut messages: Vec<ChatMessage> = Vec::new();

    if let Some(system) = req.system_text() {
        messages.push(ChatMessage::text("system", system));
    }

    for msg in &req.messages {
        convert_message(msg.role, &msg.content, &mut messages)?;
    }

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| ChatTool {
                kind: "function".to_string(),
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    });

    Ok(ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stop: req.stop_sequences.clone(),
        tools,
        stream: req.stream,
        stream_options: req.stream.then(|| json!({"include_usage": true})),
    })
}

fn convert_message(
    role: Role,
    content: &switchyard_protocol::Content,
    out: &mut Vec<ChatMessage>,
) -> ProviderResult<()> {
    let role_str = role.as_str();

    if let Some(text) = content.as_text_only() {
        out.push(ChatMessage::text(role_str, text));
        return Ok(());
    }

    // Tool results become separate `role: tool` messages, so any text seen
    // before one is flushed first to keep the original order.
    let mut pending_text = String::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in content.as_blocks() {
        match block {
            ContentBlock::Text { text } => pending_text.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ChatToolCall {
                    id,
                    kind: function_kind(),
                    function: ChatFunctionCall {
                        name,
                        arguments: serde_json::to_string(&input)?,
                    },
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                if !pending_text.is_empty() {
                    out.push(ChatMessage::text(role_str, std::mem::take(&mut pending_text)));
                }
                out.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(content.to_plaintext()),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id),
                });
            }
        }
    }

    // Avoid emitting empty messages unless they carry tool calls.
    if !pending_text.is_empty() || !tool_calls.is_empty() {
        out.push(ChatMessage {
            role: role_str.to_string(),
            content: (!pending_text.is_empty()).then_some(pending_text),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }

    Ok(())
}

/// Convert an OpenAI `chat/completions` response into an Anthropic Messages
/// response. The response always gets a fresh `msg_` id.
pub fn from_provider_format(
    resp: ChatCompletionResponse,
    requested_model: &str,
) -> ProviderResult<CanonicalResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0]".to_string()))?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content.filter(|s| !s.is_empty()) {
        content.push(ContentBlock::Text { text });
    }

    for call in choice.message.tool_calls.unwrap_or_default() {
        content.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input: parse_arguments(&call.function.arguments),
        });
    }

    let usage = resp
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    let model = resp
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| requested_model.to_string());

    Ok(CanonicalResponse::new(
        model,
        content,
        map_finish_reason(choice.finish_reason.as_deref()),
        usage,
    ))
}

/// Parse tool-call arguments. Empty arguments mean an empty object; text that
/// is not JSON is kept under `raw` rather than dropped.
pub(crate) fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| json!({ "raw": arguments }))
}

/// Map an OpenAI `finish_reason` onto an Anthropic stop reason. Unknown and
/// missing reasons fall back to `end_turn`.
pub fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}
