//! Known models and their pricing
//!
//! Prices are USD per 1M tokens. Local models and the native `claude` /
//! `default` identifiers always cost nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::{CoreError, CoreResult};

/// Identifiers routed to the native provider instead of a proxy.
pub const NATIVE_MODEL_IDS: &[&str] = &["default", "claude"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(rename = "inputPer1M")]
    pub input_per_1m: f64,
    #[serde(rename = "outputPer1M")]
    pub output_per_1m: f64,
}

impl Pricing {
    pub const FREE: Pricing = Pricing {
        input_per_1m: 0.0,
        output_per_1m: 0.0,
    };

    /// Cost in USD for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_1m + output_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_free: bool,
}

impl ModelInfo {
    fn is_zero_cost(&self) -> bool {
        self.provider == "ollama" || NATIVE_MODEL_IDS.contains(&self.id.as_str())
    }
}

// (id, provider, input, output, tags, free)
type Entry = (&'static str, &'static str, f64, f64, &'static [&'static str], bool);

const BUILTIN_MODELS: &[Entry] = &[
    ("claude", "claude", 0.0, 0.0, &["native"], false),
    ("default", "claude", 0.0, 0.0, &["native"], false),
    ("openai/gpt-4o", "openai", 2.50, 10.00, &["chat", "vision", "tools"], false),
    ("openai/gpt-4o-mini", "openai", 0.15, 0.60, &["chat", "fast", "tools"], false),
    ("openai/o3-mini", "openai", 1.10, 4.40, &["reasoning", "tools"], false),
    ("openrouter/anthropic/claude-3.5-sonnet", "openrouter", 3.00, 15.00, &["chat", "coding", "tools"], false),
    ("openrouter/deepseek/deepseek-chat", "openrouter", 0.27, 1.10, &["chat", "coding"], false),
    ("openrouter/deepseek/deepseek-r1:free", "openrouter", 0.0, 0.0, &["reasoning"], true),
    ("openrouter/meta-llama/llama-3.3-70b-instruct:free", "openrouter", 0.0, 0.0, &["chat"], true),
    ("openrouter/google/gemini-2.0-flash-exp:free", "openrouter", 0.0, 0.0, &["chat", "vision"], true),
    ("gemini/gemini-2.0-flash", "gemini", 0.10, 0.40, &["chat", "fast", "vision"], false),
    ("gemini/gemini-1.5-pro", "gemini", 1.25, 5.00, &["chat", "long-context"], false),
    ("ollama/llama3.1", "ollama", 0.0, 0.0, &["chat", "local"], true),
    ("ollama/qwen2.5-coder", "ollama", 0.0, 0.0, &["coding", "local"], true),
    ("ollama/deepseek-r1", "ollama", 0.0, 0.0, &["reasoning", "local"], true),
];

/// Read-only table of known models.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelInfo>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self { models: Vec::new() }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (id, provider, input, output, tags, free) in BUILTIN_MODELS {
            registry.insert(ModelInfo {
                id: id.to_string(),
                provider: provider.to_string(),
                pricing: Pricing {
                    input_per_1m: *input,
                    output_per_1m: *output,
                },
                tags: tags.iter().map(|t| t.to_string()).collect(),
                is_free: *free,
            });
        }
        registry
    }

    /// Built-in table extended (or overridden by id) with a JSON array of
    /// [`ModelInfo`] entries.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let extra: Vec<ModelInfo> = serde_json::from_str(json)
            .map_err(|e| CoreError::Config(format!("invalid model table: {}", e)))?;
        let mut registry = Self::builtin();
        for model in extra {
            registry.insert(model);
        }
        Ok(registry)
    }

    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn insert(&mut self, mut model: ModelInfo) {
        if model.is_zero_cost() {
            model.pricing = Pricing::FREE;
            if model.provider == "ollama" {
                model.is_free = true;
            }
        }
        match self.models.iter_mut().find(|m| m.id == model.id) {
            Some(existing) => *existing = model,
            None => self.models.push(model),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Pricing for `id`; unknown, local and native ids are free.
    pub fn get_pricing(&self, id: &str) -> Pricing {
        if id.starts_with("ollama/") || NATIVE_MODEL_IDS.contains(&id) {
            return Pricing::FREE;
        }
        self.get(id).map(|m| m.pricing).unwrap_or(Pricing::FREE)
    }

    pub fn list_models(&self, provider: Option<&str>) -> Vec<&ModelInfo> {
        self.models
            .iter()
            .filter(|m| provider.map_or(true, |p| m.provider.eq_ignore_ascii_case(p)))
            .collect()
    }

    /// Case-insensitive match on id substring or tag.
    pub fn search_models(&self, term: &str) -> Vec<&ModelInfo> {
        let term = term.to_lowercase();
        self.models
            .iter()
            .filter(|m| {
                m.id.to_lowercase().contains(&term)
                    || m.tags.iter().any(|t| t.to_lowercase() == term)
            })
            .collect()
    }

    pub fn get_free_models(&self) -> Vec<&ModelInfo> {
        self.models.iter().filter(|m| m.is_free).collect()
    }
}
