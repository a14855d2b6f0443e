//! Anthropic <-> Gemini `generateContent` translation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use switchyard_protocol::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Role, StopReason, Usage,
};

use super::streaming::{sse_data, StreamAccumulator};
use crate::{ProviderError, ProviderResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiSystemInstruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiTools>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiSystemInstruction {
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    /// Parts this gateway does not translate (inline data, code execution).
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiTools {
    pub function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: GeminiContent,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

/// Convert an Anthropic Messages request into a Gemini `generateContent`
/// request body. The model goes into the URL, not the body.
pub fn to_provider_format(req: &CanonicalRequest) -> ProviderResult<GenerateContentRequest> {
    // Gemini answers a function by name, Anthropic by call id.
    let mut tool_names: HashMap<String, String> = HashMap::new();
    for msg in &req.messages {
        for block in msg.content.as_blocks() {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                tool_names.insert(id, name);
            }
        }
    }

    let contents = req
        .messages
        .iter()
        .map(|msg| GeminiContent {
            role: match msg.role {
                Role::User => "user".to_string(),
                Role::Assistant => "model".to_string(),
            },
            parts: msg
                .content
                .as_blocks()
                .into_iter()
                .map(|block| convert_block(block, &tool_names))
                .collect(),
        })
        .collect();

    let system_instruction = req.system_text().map(|text| GeminiSystemInstruction {
        parts: vec![GeminiPart::Text { text }],
    });

    let tools = req.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
        vec![GeminiTools {
            function_declarations: tools
                .iter()
                .map(|t| GeminiFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                })
                .collect(),
        }]
    });

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
        tools,
        generation_config: Some(GenerationConfig {
            max_output_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stop_sequences: req.stop_sequences.clone(),
        }),
    })
}

fn convert_block(block: ContentBlock, tool_names: &HashMap<String, String>) -> GeminiPart {
    match block {
        ContentBlock::Text { text } => GeminiPart::Text { text },
        ContentBlock::ToolUse { name, input, .. } => GeminiPart::FunctionCall {
            function_call: GeminiFunctionCall { name, args: input },
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } => GeminiPart::FunctionResponse {
            function_response: GeminiFunctionResponse {
                name: tool_names.get(&tool_use_id).cloned().unwrap_or(tool_use_id),
                response: json!({ "result": content.to_plaintext() }),
            },
        },
    }
}

/// Convert a Gemini response into an Anthropic Messages response. Every part
/// of the first candidate becomes one content block, in order.
pub fn from_provider_format(
    resp: GenerateContentResponse,
    requested_model: &str,
) -> ProviderResult<CanonicalResponse> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("missing candidates[0]".to_string()))?;

    let mut content = Vec::new();
    for part in candidate.content.parts {
        match part {
            GeminiPart::Text { text } => content.push(ContentBlock::Text { text }),
            GeminiPart::FunctionCall { function_call } => content.push(ContentBlock::ToolUse {
                id: new_tool_use_id(),
                name: function_call.name,
                input: normalize_args(function_call.args),
            }),
            GeminiPart::FunctionResponse { .. } | GeminiPart::Other(_) => {}
        }
    }

    let has_tool_use = content
        .iter()
        .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    let stop_reason = if has_tool_use {
        StopReason::ToolUse
    } else {
        map_finish_reason(candidate.finish_reason.as_deref())
    };

    let usage = resp
        .usage_metadata
        .map(|u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(CanonicalResponse::new(
        requested_model,
        content,
        stop_reason,
        usage,
    ))
}

/// Map a Gemini `finishReason` onto an Anthropic stop reason. Anything other
/// than `MAX_TOKENS` ends the turn.
pub fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

fn new_tool_use_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}

fn normalize_args(args: Value) -> Value {
    if args.is_null() {
        json!({})
    } else {
        args
    }
}

/// Translate one line of a Gemini `streamGenerateContent?alt=sse` stream into
/// at most one Anthropic SSE frame. Gemini has no `[DONE]` marker: the chunk
/// carrying `finishReason` closes the message.
pub fn transform_gemini_stream_line(line: &str, acc: &mut StreamAccumulator) -> Option<String> {
    let data = sse_data(line)?;
    if acc.finished {
        return None;
    }

    let chunk: GenerateContentResponse = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, data, "skipping unparseable gemini stream chunk");
            return None;
        }
    };

    if let Some(usage) = chunk.usage_metadata {
        acc.usage = Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        };
    }

    let candidate = chunk.candidates.into_iter().next()?;
    let mut frames = String::new();

    for part in candidate.content.parts {
        match part {
            GeminiPart::Text { text } if !text.is_empty() => {
                acc.ensure_started(&mut frames);
                acc.text_delta(&text, &mut frames);
            }
            GeminiPart::FunctionCall { function_call } => {
                acc.ensure_started(&mut frames);
                let tool_index = acc.tool_calls.len();
                acc.start_tool_call(tool_index, new_tool_use_id(), function_call.name, &mut frames);
                let args = serde_json::to_string(&normalize_args(function_call.args))
                    .unwrap_or_else(|_| "{}".to_string());
                acc.tool_arguments_delta(tool_index, &args, &mut frames);
            }
            _ => {}
        }
    }

    if let Some(reason) = candidate.finish_reason.as_deref() {
        acc.ensure_started(&mut frames);
        let stop_reason = if acc.tool_calls.is_empty() {
            map_finish_reason(Some(reason))
        } else {
            StopReason::ToolUse
        };
        acc.set_stop_reason(stop_reason, &mut frames);
        acc.stop(&mut frames);
    }

    (!frames.is_empty()).then_some(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_protocol::{Message, Tool, ToolResultContent};

    #[test]
    fn maps_roles_system_and_generation_config() {
        let mut req = CanonicalRequest::new(
            "gemini/gemini-2.0-flash",
            vec![Message::user("hi"), Message::assistant("hello")],
            512,
        )
        .with_system("be brief");
        req.temperature = Some(0.5);
        req.top_p = Some(0.9);

        let out = serde_json::to_value(to_provider_format(&req).unwrap()).unwrap();
        assert_eq!(out["contents"][0]["role"], "user");
        assert_eq!(out["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(out["contents"][1]["role"], "model");
        assert_eq!(out["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(out["generationConfig"]["maxOutputTokens"], 512);
        assert_eq!(out["generationConfig"]["temperature"], 0.5);
        assert!((out["generationConfig"]["topP"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn tool_blocks_become_function_parts() {
        let req = CanonicalRequest::new(
            "gemini/gemini-2.0-flash",
            vec![
                Message::with_blocks(
                    Role::Assistant,
                    vec![ContentBlock::ToolUse {
                        id: "toolu_1".into(),
                        name: "get_weather".into(),
                        input: json!({"city": "Seoul"}),
                    }],
                ),
                Message::with_blocks(
                    Role::User,
                    vec![ContentBlock::ToolResult {
                        tool_use_id: "toolu_1".into(),
                        content: ToolResultContent::String("sunny".into()),
                        is_error: None,
                    }],
                ),
            ],
            100,
        )
        .with_tools(vec![Tool {
            name: "get_weather".into(),
            description: Some("Weather lookup".into()),
            input_schema: json!({"type": "object"}),
        }]);

        let out = serde_json::to_value(to_provider_format(&req).unwrap()).unwrap();
        assert_eq!(
            out["contents"][0]["parts"][0]["functionCall"],
            json!({"name": "get_weather", "args": {"city": "Seoul"}})
        );
        assert_eq!(
            out["contents"][1]["parts"][0]["functionResponse"],
            json!({"name": "get_weather", "response": {"result": "sunny"}})
        );
        assert_eq!(
            out["tools"][0]["functionDeclarations"][0]["name"],
            "get_weather"
        );
    }

    #[test]
    fn multiple_parts_become_ordered_blocks() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "one"}, {"text": "two"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}
        }))
        .unwrap();

        let out = from_provider_format(resp, "gemini-2.0-flash").unwrap();
        assert!(out.id.starts_with("msg_"));
        assert_eq!(out.content, vec![ContentBlock::text("one"), ContentBlock::text("two")]);
        assert_eq!(out.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(out.usage, Usage { input_tokens: 4, output_tokens: 2 });
    }

    #[test]
    fn function_call_response_is_tool_use() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"functionCall": {"name": "ls", "args": {"path": "."}}}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let out = from_provider_format(resp, "g").unwrap();
        match &out.content[0] {
            ContentBlock::ToolUse { name, input, id } => {
                assert_eq!(name, "ls");
                assert_eq!(input, &json!({"path": "."}));
                assert!(id.starts_with("toolu_"));
            }
            other => panic!("expected tool_use, got {:?}", other),
        }
        assert_eq!(out.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("STOP")), StopReason::EndTurn);
        assert_eq!(map_finish_reason(Some("MAX_TOKENS")), StopReason::MaxTokens);
        assert_eq!(map_finish_reason(Some("SAFETY")), StopReason::EndTurn);
        assert_eq!(map_finish_reason(None), StopReason::EndTurn);
    }

    #[test]
    fn stream_lines_translate_and_close_on_finish() {
        let mut acc = StreamAccumulator::new("gemini-2.0-flash");
        let out = transform_gemini_stream_line(
            r#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"Hi"}]}}]}"#,
            &mut acc,
        )
        .unwrap();
        assert!(out.contains("event: message_start"));
        assert!(out.contains(r#""text":"Hi""#));

        let out = transform_gemini_stream_line(
            r#"data: {"candidates":[{"content":{"role":"model","parts":[{"text":"!"}]},"finishReason":"MAX_TOKENS"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":2}}"#,
            &mut acc,
        )
        .unwrap();
        assert!(out.contains(r#""stop_reason":"max_tokens""#));
        assert!(out.contains(r#""usage":{"input_tokens":3,"output_tokens":2}"#));
        assert!(out.ends_with("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"));
        assert!(acc.finished);
        assert_eq!(acc.usage.output_tokens, 2);
    }
}
