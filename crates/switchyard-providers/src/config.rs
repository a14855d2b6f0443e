//! Handler configuration

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ProviderError;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Local models can take a long time to load on first use.
const DEFAULT_LOCAL_TIMEOUT_SECS: u64 = 300;

/// The closed set of providers the gateway can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    Ollama,
    OpenRouter,
    OpenAI,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Ollama,
        ProviderKind::OpenRouter,
        ProviderKind::OpenAI,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Local daemons run on the loopback interface and take no credentials.
    pub fn is_local(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }

    pub fn requires_api_key(&self) -> bool {
        !self.is_local()
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    /// Environment variables consulted for this provider's API key, in order.
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Ollama => &[],
            ProviderKind::OpenRouter => &["OPENROUTER_API_KEY"],
            ProviderKind::OpenAI => &["OPENAI_API_KEY"],
            ProviderKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "openai" => Ok(ProviderKind::OpenAI),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            _ => Err(ProviderError::UnknownProvider(s.to_string())),
        }
    }
}

/// Everything needed to construct a handler.
#[derive(Clone)]
pub struct HandlerConfig {
    pub provider: ProviderKind,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl HandlerConfig {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: None,
            timeout_seconds: None,
        }
    }

    pub fn ollama() -> Self {
        Self::new(ProviderKind::Ollama)
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenRouter).with_api_key(api_key)
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenAI).with_api_key(api_key)
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::Gemini).with_api_key(api_key)
    }

    /// Build from a provider name, failing on unknown names.
    pub fn parse(provider: &str) -> Result<Self, ProviderError> {
        Ok(Self::new(provider.parse()?))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Base URL without a trailing slash.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        let default = if self.provider.is_local() {
            DEFAULT_LOCAL_TIMEOUT_SECS
        } else {
            DEFAULT_TIMEOUT_SECS
        };
        Duration::from_secs(self.timeout_seconds.unwrap_or(default))
    }

    /// Non-empty API key, if one was supplied.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .filter(|k| !k.trim().is_empty())
    }

    /// Fail when a remote provider is missing its key.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.provider.requires_api_key() && self.api_key().is_none() {
            let hint = self
                .provider
                .api_key_env_vars()
                .first()
                .map(|var| format!(" (set {})", var))
                .unwrap_or_default();
            return Err(ProviderError::Configuration(format!(
                "API key required for {}{}",
                self.provider, hint
            )));
        }
        Ok(())
    }

    /// Identity of a handler built from this config: provider, key, base URL
    /// and effective timeout.
    pub(crate) fn cache_key(&self) -> (ProviderKind, Option<String>, String, u64) {
        (
            self.provider,
            self.api_key().map(str::to_string),
            self.resolved_base_url(),
            self.timeout().as_secs(),
        )
    }
}
