//! Pure format transformers between the canonical Anthropic shape and each
//! provider's wire dialect. Nothing in here performs I/O.

pub mod gemini;
pub mod openai;
pub mod streaming;

pub use streaming::{finish_stream, transform_openai_stream_line, StreamAccumulator};
