//! Routing and execution layer: which model a prompt should use, how the call
//! is executed (native or proxied, with optional fallback) and what it cost.

pub mod config;
mod cost_tracker;
mod credentials;
mod error;
mod executor;
mod model_registry;
mod native;
mod router;

pub use config::{ModelsConfig, ProviderSettings, SwitchyardConfig};
pub use cost_tracker::{default_store_path, CostTracker, UsageRecord, UsageStats};
pub use credentials::Credentials;
pub use error::{CoreError, CoreResult};
pub use executor::{
    estimate_tokens, parse_model, Completion, ExecuteRequest, ExecuteResult, FallbackCallback,
    ModelExecutor, Route, StreamCompletion, DEFAULT_MAX_TOKENS,
};
pub use model_registry::{ModelInfo, ModelRegistry, Pricing, NATIVE_MODEL_IDS};
pub use native::{ClaudeCli, NativeProvider, NATIVE_PROVIDER};
pub use router::{ModelRouter, PromptType, ResolveModelParams, DEFAULT_MODEL};
