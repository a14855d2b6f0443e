//! Switchyard Protocol - the canonical request/response shape
//!
//! Every client talks to the gateway in the Anthropic Messages dialect. This
//! crate holds that dialect as plain serde types:
//! - Requests (`CanonicalRequest`) with role-tagged messages and tools
//! - Typed content blocks (text, tool use, tool result)
//! - Responses (`CanonicalResponse`) with stop reason and token usage
//! - Anthropic stream-event frames used when re-emitting SSE

mod messages;
mod stream;

pub use messages::*;
pub use stream::*;
