//! Streaming conversion (SSE).
//!
//! OpenAI-compatible backends stream `data: {json}` lines ending with a
//! literal `data: [DONE]`. Clients expect Anthropic stream events
//! (`message_start`, `content_block_delta`, ...).
//!
//! Translation works one upstream line at a time: each call takes one line
//! and yields zero or one SSE frame. Everything that has to survive between
//! lines (open content block, per-tool-call argument buffers, usage) lives in
//! a [`StreamAccumulator`] that the caller threads through the calls.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use switchyard_protocol::{
    new_message_id, ContentBlock, ContentDelta, DeltaUsage, MessageDelta, StopReason,
    StreamEvent, StreamMessageStart, Usage,
};

use super::openai::map_finish_reason;

/// What kind of content block is currently open downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenBlock {
    Text { index: usize },
    ToolUse { index: usize, tool_index: usize },
}

impl OpenBlock {
    fn index(&self) -> usize {
        match self {
            OpenBlock::Text { index } | OpenBlock::ToolUse { index, .. } => *index,
        }
    }
}

/// A tool call being assembled from partial deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallBuffer {
    pub block_index: usize,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Cross-line state of one streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamAccumulator {
    pub model: String,
    pub message_id: Option<String>,
    pub open_block: Option<OpenBlock>,
    pub next_block_index: usize,
    /// Keyed by the upstream tool-call index.
    pub tool_calls: BTreeMap<usize, ToolCallBuffer>,
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
    pub finished: bool,
}

impl StreamAccumulator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn started(&self) -> bool {
        self.message_id.is_some()
    }

    /// Accumulated tool calls, in upstream order.
    pub fn tool_use_blocks(&self) -> Vec<ContentBlock> {
        self.tool_calls
            .values()
            .map(|call| ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: super::openai::parse_arguments(&call.arguments),
            })
            .collect()
    }

    pub(crate) fn ensure_started(&mut self, frames: &mut String) {
        if self.message_id.is_none() {
            let id = new_message_id();
            self.message_id = Some(id.clone());
            push(
                frames,
                StreamEvent::MessageStart {
                    message: StreamMessageStart::new(id, self.model.clone()),
                },
            );
        }
    }

    pub(crate) fn close_open_block(&mut self, frames: &mut String) {
        if let Some(block) = self.open_block.take() {
            push(frames, StreamEvent::ContentBlockStop { index: block.index() });
        }
    }

    pub(crate) fn text_delta(&mut self, text: &str, frames: &mut String) {
        let index = match self.open_block {
            Some(OpenBlock::Text { index }) => index,
            _ => {
                self.close_open_block(frames);
                let index = self.allocate_block();
                self.open_block = Some(OpenBlock::Text { index });
                push(
                    frames,
                    StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlock::text(""),
                    },
                );
                index
            }
        };
        push(
            frames,
            StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::TextDelta {
                    text: text.to_string(),
                },
            },
        );
    }

    /// Open a tool-use block for a call seen for the first time.
    pub(crate) fn start_tool_call(
        &mut self,
        tool_index: usize,
        id: String,
        name: String,
        frames: &mut String,
    ) -> usize {
        self.close_open_block(frames);
        let index = self.allocate_block();
        self.open_block = Some(OpenBlock::ToolUse { index, tool_index });
        self.tool_calls.insert(
            tool_index,
            ToolCallBuffer {
                block_index: index,
                id: id.clone(),
                name: name.clone(),
                arguments: String::new(),
            },
        );
        push(
            frames,
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse {
                    id,
                    name,
                    input: json!({}),
                },
            },
        );
        index
    }

    pub(crate) fn tool_arguments_delta(
        &mut self,
        tool_index: usize,
        partial_json: &str,
        frames: &mut String,
    ) {
        let Some(call) = self.tool_calls.get_mut(&tool_index) else {
            return;
        };
        call.arguments.push_str(partial_json);
        push(
            frames,
            StreamEvent::ContentBlockDelta {
                index: call.block_index,
                delta: ContentDelta::InputJsonDelta {
                    partial_json: partial_json.to_string(),
                },
            },
        );
    }

    /// Remember why the upstream stopped. The closing `message_delta` waits
    /// for [`StreamAccumulator::stop`] so trailing usage chunks still count.
    pub(crate) fn set_stop_reason(&mut self, stop_reason: StopReason, frames: &mut String) {
        self.close_open_block(frames);
        self.stop_reason = Some(stop_reason);
    }

    /// Emit `message_delta` with the final usage, then `message_stop`.
    pub(crate) fn stop(&mut self, frames: &mut String) {
        self.close_open_block(frames);
        push(
            frames,
            StreamEvent::MessageDelta {
                delta: MessageDelta {
                    stop_reason: Some(self.stop_reason.unwrap_or(StopReason::EndTurn)),
                    stop_sequence: None,
                },
                usage: DeltaUsage::from(self.usage),
            },
        );
        self.finished = true;
        push(frames, StreamEvent::MessageStop);
    }

    fn allocate_block(&mut self) -> usize {
        let index = self.next_block_index;
        self.next_block_index += 1;
        index
    }
}

pub(crate) fn push(frames: &mut String, event: StreamEvent) {
    frames.push_str(&event.to_sse_frame());
}

/// Payload of an SSE `data:` line, `None` for any other line.
pub fn sse_data(line: &str) -> Option<&str> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix("data:")
        .map(str::trim)
}

/// Translate one upstream OpenAI SSE line into at most one Anthropic SSE
/// frame.
///
/// - a `role` delta at stream start -> `message_start`
/// - a `content` delta -> `content_block_delta` / `text_delta`
/// - a `tool_calls` delta -> `content_block_delta` / `input_json_delta`
/// - a `finish_reason` -> closes the open block and records the stop reason
/// - `[DONE]` -> `message_delta` (stop reason, final usage) + `message_stop`
///
/// The returned frame opens (or closes) content blocks as needed, so a single
/// frame may hold a `content_block_start` ahead of its delta. Empty deltas,
/// comments, blank lines and unparseable payloads produce nothing.
pub fn transform_openai_stream_line(line: &str, acc: &mut StreamAccumulator) -> Option<String> {
    let data = sse_data(line)?;
    if acc.finished {
        return None;
    }

    let mut frames = String::new();

    if data == "[DONE]" {
        acc.ensure_started(&mut frames);
        acc.stop(&mut frames);
        return Some(frames);
    }

    let chunk: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, data, "skipping unparseable stream chunk");
            return None;
        }
    };

    // With `stream_options.include_usage` the usage arrives on its own chunk
    // (`choices: []`) after the one carrying `finish_reason`.
    if let Some(usage) = chunk.get("usage").and_then(Value::as_object) {
        if let Some(p) = usage.get("prompt_tokens").and_then(Value::as_u64) {
            acc.usage.input_tokens = p as u32;
        }
        if let Some(c) = usage.get("completion_tokens").and_then(Value::as_u64) {
            acc.usage.output_tokens = c as u32;
        }
    }

    let choice = chunk
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())?;
    let delta = choice.get("delta");

    if delta.and_then(|d| d.get("role")).is_some_and(|r| !r.is_null()) {
        acc.ensure_started(&mut frames);
    }

    if let Some(text) = delta
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    {
        acc.ensure_started(&mut frames);
        acc.text_delta(text, &mut frames);
    }

    if let Some(calls) = delta
        .and_then(|d| d.get("tool_calls"))
        .and_then(Value::as_array)
    {
        for call in calls {
            let tool_index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
            let function = call.get("function");
            let arguments = function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or("");

            acc.ensure_started(&mut frames);
            if !acc.tool_calls.contains_key(&tool_index) {
                let id = call
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));
                let name = function
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                acc.start_tool_call(tool_index, id, name, &mut frames);
            }
            if !arguments.is_empty() {
                acc.tool_arguments_delta(tool_index, arguments, &mut frames);
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        acc.ensure_started(&mut frames);
        acc.set_stop_reason(map_finish_reason(Some(reason)), &mut frames);
    }

    (!frames.is_empty()).then_some(frames)
}

/// Close a stream whose upstream ended without a terminal marker.
pub fn finish_stream(acc: &mut StreamAccumulator) -> Option<String> {
    if acc.finished {
        return None;
    }
    let mut frames = String::new();
    acc.ensure_started(&mut frames);
    acc.stop(&mut frames);
    Some(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(frame: &str) -> Vec<Value> {
        frame
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .map(|d| serde_json::from_str(d).unwrap())
            .collect()
    }

    #[test]
    fn role_delta_starts_message() {
        let mut acc = StreamAccumulator::new("gpt-4o");
        let out = transform_openai_stream_line(
            r#"data: {"id":"c1","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            &mut acc,
        )
        .unwrap();
        let evs = events(&out);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0]["type"], "message_start");
        assert_eq!(evs[0]["message"]["model"], "gpt-4o");
        assert!(evs[0]["message"]["id"].as_str().unwrap().starts_with("msg_"));
    }

    #[test]
    fn content_delta_becomes_text_delta() {
        let mut acc = StreamAccumulator::new("m");
        transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            &mut acc,
        );
        let out = transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            &mut acc,
        )
        .unwrap();
        let evs = events(&out);
        assert_eq!(evs[0]["type"], "content_block_start");
        assert_eq!(evs[1]["type"], "content_block_delta");
        assert_eq!(evs[1]["delta"], json!({"type": "text_delta", "text": "Hel"}));

        // Second delta reuses the open block.
        let out = transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            &mut acc,
        )
        .unwrap();
        let evs = events(&out);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0]["index"], 0);
        assert_eq!(evs[0]["delta"]["text"], "lo");
    }

    #[test]
    fn empty_delta_emits_nothing() {
        let mut acc = StreamAccumulator::new("m");
        transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            &mut acc,
        );
        assert_eq!(
            transform_openai_stream_line(r#"data: {"choices":[{"delta":{}}]}"#, &mut acc),
            None
        );
        assert_eq!(
            transform_openai_stream_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#, &mut acc),
            None
        );
        assert_eq!(transform_openai_stream_line("", &mut acc), None);
        assert_eq!(transform_openai_stream_line(": keep-alive", &mut acc), None);
    }

    #[test]
    fn tool_call_deltas_accumulate_partial_json() {
        let mut acc = StreamAccumulator::new("m");
        let out = transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"ls","arguments":""}}]}}]}"#,
            &mut acc,
        )
        .unwrap();
        let evs = events(&out);
        assert_eq!(evs[0]["type"], "message_start");
        assert_eq!(evs[1]["type"], "content_block_start");
        assert_eq!(evs[1]["content_block"]["name"], "ls");

        for part in [r#"{\"pa"#, r#"th\":\"src\"}"#] {
            let line = format!(
                r#"data: {{"choices":[{{"delta":{{"tool_calls":[{{"index":0,"function":{{"arguments":"{}"}}}}]}}}}]}}"#,
                part
            );
            let out = transform_openai_stream_line(&line, &mut acc).unwrap();
            let evs = events(&out);
            assert_eq!(evs[0]["delta"]["type"], "input_json_delta");
        }

        assert_eq!(acc.tool_calls[&0].arguments, r#"{"path":"src"}"#);
        assert_eq!(
            acc.tool_use_blocks(),
            vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "ls".into(),
                input: json!({"path": "src"})
            }]
        );
    }

    #[test]
    fn finish_reason_and_done_close_the_stream() {
        let mut acc = StreamAccumulator::new("m");
        transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
            &mut acc,
        );
        let out = transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{},"finish_reason":"length"}],"usage":{"prompt_tokens":5,"completion_tokens":7}}"#,
            &mut acc,
        )
        .unwrap();
        let evs = events(&out);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0]["type"], "content_block_stop");

        let out = transform_openai_stream_line("data: [DONE]", &mut acc).unwrap();
        let evs = events(&out);
        assert_eq!(evs[0]["type"], "message_delta");
        assert_eq!(evs[0]["delta"]["stop_reason"], "max_tokens");
        assert_eq!(evs[0]["usage"], json!({"input_tokens": 5, "output_tokens": 7}));
        assert_eq!(evs[1], json!({"type": "message_stop"}));
        assert!(acc.finished);
        assert_eq!(transform_openai_stream_line("data: [DONE]", &mut acc), None);
        assert_eq!(finish_stream(&mut acc), None);
    }

    #[test]
    fn usage_chunk_after_finish_reason_is_reported() {
        let mut acc = StreamAccumulator::new("m");
        for line in [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ] {
            transform_openai_stream_line(line, &mut acc);
        }
        assert_eq!(
            transform_openai_stream_line(
                r#"data: {"choices":[],"usage":{"prompt_tokens":10000,"completion_tokens":2000}}"#,
                &mut acc,
            ),
            None
        );

        let out = transform_openai_stream_line("data: [DONE]", &mut acc).unwrap();
        let evs = events(&out);
        assert_eq!(evs[0]["delta"]["stop_reason"], "end_turn");
        assert_eq!(evs[0]["usage"]["input_tokens"], 10000);
        assert_eq!(evs[0]["usage"]["output_tokens"], 2000);
    }

    #[test]
    fn accumulator_serializes() {
        let mut acc = StreamAccumulator::new("m");
        transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
            &mut acc,
        );
        let json = serde_json::to_string(&acc).unwrap();
        let back: StreamAccumulator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, acc);
    }

    #[test]
    fn truncated_stream_is_closed() {
        let mut acc = StreamAccumulator::new("m");
        transform_openai_stream_line(
            r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
            &mut acc,
        );
        let out = finish_stream(&mut acc).unwrap();
        let evs = events(&out);
        let kinds: Vec<_> = evs.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["content_block_stop", "message_delta", "message_stop"]);
    }
}
