//! Anthropic Messages wire types.
//!
//! Incoming requests can use shorthand strings for `system` and
//! `message.content`; these are accepted via `#[serde(untagged)]` enums.
//! Internally the structured `Vec<ContentBlock>` representation is preferred.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message role in the Anthropic Messages API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message in the Anthropic Messages API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    /// Either a string or an array of content blocks.
    pub content: Content,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::String(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::String(text.into()),
        }
    }

    pub fn with_blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: Content::Blocks(blocks),
        }
    }
}

/// Either a string shorthand or a full content block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    String(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Borrowed conversion to a block list.
    pub fn as_blocks(&self) -> Vec<ContentBlock> {
        match self {
            Content::String(s) => vec![ContentBlock::Text { text: s.clone() }],
            Content::Blocks(v) => v.clone(),
        }
    }

    /// `Some(text)` when the content is a string or consists only of text
    /// blocks, which collapse into one string.
    pub fn as_text_only(&self) -> Option<String> {
        match self {
            Content::String(s) => Some(s.clone()),
            Content::Blocks(blocks) => {
                let mut out = String::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => out.push_str(text),
                        _ => return None,
                    }
                }
                Some(out)
            }
        }
    }

    /// Lossy plain-text representation.
    pub fn to_plaintext(&self) -> String {
        match self {
            Content::String(s) => s.clone(),
            Content::Blocks(blocks) => blocks.iter().map(ContentBlock::to_plaintext).collect(),
        }
    }
}

/// System prompt input.
///
/// The Anthropic API accepts either a plain string, or an array of typed
/// system content objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemContent {
    String(String),
    Blocks(Vec<SystemBlock>),
}

impl SystemContent {
    /// Convert to a plain string (joining blocks in order).
    pub fn to_plaintext(&self) -> String {
        match self {
            SystemContent::String(s) => s.clone(),
            SystemContent::Blocks(v) => v.iter().map(|b| b.text.as_str()).collect(),
        }
    }
}

impl From<&str> for SystemContent {
    fn from(value: &str) -> Self {
        SystemContent::String(value.to_string())
    }
}

/// A system content block. Only `text` blocks exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type", default = "text_kind")]
    pub kind: String,
    pub text: String,
}

fn text_kind() -> String {
    "text".to_string()
}

/// A content block within `messages[].content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },

    /// A tool invocation requested by the model.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    /// A tool invocation result supplied by the client.
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: ToolResultContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Lossy plain-text representation (tool calls are stringified).
    pub fn to_plaintext(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::ToolUse { name, .. } => format!("[tool_use:{}]", name),
            ContentBlock::ToolResult { content, .. } => content.to_plaintext(),
        }
    }
}

/// Tool result content can be a string shorthand or an array of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    String(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for ToolResultContent {
    fn default() -> Self {
        ToolResultContent::String(String::new())
    }
}

impl ToolResultContent {
    pub fn to_plaintext(&self) -> String {
        match self {
            ToolResultContent::String(s) => s.clone(),
            ToolResultContent::Blocks(v) => v.iter().map(ContentBlock::to_plaintext).collect(),
        }
    }
}

/// Tool definition (Anthropic schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Request body for `/v1/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemContent>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default)]
    pub stream: bool,
    /// Anthropic-only; never forwarded to another provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CanonicalRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            tools: None,
            stream: false,
            metadata: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(SystemContent::String(system.into()));
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// System prompt as plain text, `None` when absent or empty.
    pub fn system_text(&self) -> Option<String> {
        self.system
            .as_ref()
            .map(SystemContent::to_plaintext)
            .filter(|s| !s.is_empty())
    }

    /// Flatten the whole conversation into one prompt string, for providers
    /// that only accept text.
    pub fn to_prompt_text(&self) -> String {
        let mut sections = Vec::new();
        if let Some(system) = self.system_text() {
            sections.push(system);
        }
        let single_user_turn = self.messages.len() == 1 && self.messages[0].role == Role::User;
        for message in &self.messages {
            let text = message.content.to_plaintext();
            if single_user_turn {
                sections.push(text);
            } else {
                sections.push(format!("{}: {}", message.role.as_str(), text));
            }
        }
        sections.join("\n\n")
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    #[serde(other)]
    Other,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::MaxTokens => "max_tokens",
            StopReason::ToolUse => "tool_use",
            StopReason::Other => "other",
        }
    }
}

/// Token usage info.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Response body for `/v1/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    pub id: String,
    #[serde(rename = "type", default = "message_kind")]
    pub kind: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

fn message_kind() -> String {
    "message".to_string()
}

impl CanonicalResponse {
    /// A fresh assistant response with a new `msg_` id.
    pub fn new(
        model: impl Into<String>,
        content: Vec<ContentBlock>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        Self {
            id: new_message_id(),
            kind: message_kind(),
            role: Role::Assistant,
            content,
            model: model.into(),
            stop_reason: Some(stop_reason),
            stop_sequence: None,
            usage,
        }
    }

    /// Concatenated text of every `text` block.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Generate a message id in Anthropic's `msg_` form.
pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_accepts_string_and_block_content() {
        let req: CanonicalRequest = serde_json::from_value(json!({
            "model": "openrouter/openai/gpt-4o",
            "max_tokens": 100,
            "system": [{"type": "text", "text": "be brief"}],
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "ls", "input": {"path": "."}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "a.txt"}
                ]}
            ]
        }))
        .unwrap();

        assert!(!req.stream);
        assert_eq!(req.system_text().as_deref(), Some("be brief"));
        assert_eq!(req.messages[0].content, Content::String("hi".into()));
        assert!(matches!(
            req.messages[1].content.as_blocks()[0],
            ContentBlock::ToolUse { .. }
        ));
    }

    #[test]
    fn text_only_blocks_collapse() {
        let content = Content::Blocks(vec![ContentBlock::text("a"), ContentBlock::text("b")]);
        assert_eq!(content.as_text_only().as_deref(), Some("ab"));

        let mixed = Content::Blocks(vec![
            ContentBlock::text("a"),
            ContentBlock::ToolUse {
                id: "t".into(),
                name: "n".into(),
                input: json!({}),
            },
        ]);
        assert_eq!(mixed.as_text_only(), None);
    }

    #[test]
    fn unknown_stop_reason_deserializes_as_other() {
        let reason: StopReason = serde_json::from_value(json!("pause_turn")).unwrap();
        assert_eq!(reason, StopReason::Other);
    }

    #[test]
    fn response_ids_are_prefixed() {
        let resp = CanonicalResponse::new("m", vec![], StopReason::EndTurn, Usage::default());
        assert!(resp.id.starts_with("msg_"));
        assert_eq!(resp.kind, "message");
    }

    #[test]
    fn prompt_text_for_single_turn_is_the_message() {
        let req = CanonicalRequest::new("claude", vec![Message::user("hello")], 10);
        assert_eq!(req.to_prompt_text(), "hello");
    }
}
