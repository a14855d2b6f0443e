//! Provider credentials
//!
//! Environment variables win over keys persisted in config files.

use std::collections::HashMap;
use std::sync::Arc;
use switchyard_providers::{HandlerConfig, ProviderKind};

use crate::config::ProviderSettings;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

const OLLAMA_URL_VARS: &[&str] = &["OLLAMA_BASE_URL", "OLLAMA_HOST"];

#[derive(Clone)]
pub struct Credentials {
    persisted: HashMap<String, ProviderSettings>,
    env: EnvLookup,
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl Credentials {
    /// Persisted settings keyed by provider name, backed by the process
    /// environment.
    pub fn new(persisted: HashMap<String, ProviderSettings>) -> Self {
        Self {
            persisted,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment source.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    fn env_var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.trim().is_empty())
    }

    fn persisted(&self, provider: ProviderKind) -> Option<&ProviderSettings> {
        self.persisted.get(provider.as_str())
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<String> {
        provider
            .api_key_env_vars()
            .iter()
            .find_map(|var| self.env_var(var))
            .or_else(|| {
                self.persisted(provider)?
                    .api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    pub fn base_url(&self, provider: ProviderKind) -> Option<String> {
        let from_env = if provider == ProviderKind::Ollama {
            OLLAMA_URL_VARS
                .iter()
                .find_map(|var| self.env_var(var))
                .map(|url| with_scheme(&url))
        } else {
            None
        };
        from_env.or_else(|| self.persisted(provider)?.base_url.clone())
    }

    /// Handler config for `provider` with whatever credentials are known.
    pub fn handler_config(&self, provider: ProviderKind) -> HandlerConfig {
        let mut config = HandlerConfig::new(provider);
        if let Some(key) = self.api_key(provider) {
            config = config.with_api_key(key);
        }
        if let Some(url) = self.base_url(provider) {
            config = config.with_base_url(url);
        }
        config
    }
}

/// `OLLAMA_HOST` is commonly `host:port` without a scheme.
fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}
