//! Switchyard Providers - reaching non-Anthropic backends
//!
//! Each backend speaks its own wire dialect. This crate provides:
//! - Pure format transformers (OpenAI chat-completions, Gemini generateContent,
//!   and line-by-line SSE stream transformation)
//! - One handler per provider, each owning a single HTTP client
//! - A registry that creates and caches handlers per provider + credentials

mod config;
mod error;
pub mod handlers;
mod registry;
mod response_handling;
pub mod transform;

pub use config::{HandlerConfig, ProviderKind};
pub use error::{ProviderError, ProviderResult};
pub use handlers::{
    create_handler, GeminiHandler, Handler, OllamaHandler, OpenAiCompatibleHandler, SseStream,
};
pub use registry::HandlerRegistry;
pub use response_handling::extract_error_message;
pub use secrecy::SecretString;
