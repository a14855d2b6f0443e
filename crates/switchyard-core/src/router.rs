//! Model resolution
//!
//! Precedence is a single ordered table of resolvers; the first one that
//! yields a non-empty model wins. Results are cached per
//! `(type, name, override, frontmatter)` and stay stale until
//! [`ModelRouter::invalidate_cache`] is called.

use parking_lot::Mutex;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{find_project_config, user_config_path, SwitchyardConfig};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "claude";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptType {
    Agent,
    Command,
    Skill,
    Hook,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Agent => "agent",
            PromptType::Command => "command",
            PromptType::Skill => "skill",
            PromptType::Hook => "hook",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(PromptType::Agent),
            "command" => Ok(PromptType::Command),
            "skill" => Ok(PromptType::Skill),
            "hook" => Ok(PromptType::Hook),
            other => Err(format!("unknown prompt type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResolveModelParams {
    pub prompt_type: String,
    pub prompt_name: String,
    pub cli_override: Option<String>,
    pub frontmatter_model: Option<String>,
}

impl ResolveModelParams {
    pub fn new(prompt_type: impl Into<String>, prompt_name: impl Into<String>) -> Self {
        Self {
            prompt_type: prompt_type.into(),
            prompt_name: prompt_name.into(),
            ..Default::default()
        }
    }

    pub fn with_cli_override(mut self, model: impl Into<String>) -> Self {
        self.cli_override = Some(model.into());
        self
    }

    pub fn with_frontmatter_model(mut self, model: impl Into<String>) -> Self {
        self.frontmatter_model = Some(model.into());
        self
    }
}

/// Per-resolution view of the config sources. Files are read on first use
/// only, so a resolution settled by the CLI override touches no files.
struct Resolution<'a> {
    params: &'a ResolveModelParams,
    prompt_type: PromptType,
    project_path: Option<&'a Path>,
    user_path: Option<&'a Path>,
    project: OnceCell<Option<SwitchyardConfig>>,
    user: OnceCell<Option<SwitchyardConfig>>,
}

impl Resolution<'_> {
    fn project(&self) -> Option<&SwitchyardConfig> {
        self.project
            .get_or_init(|| read_config(self.project_path))
            .as_ref()
    }

    fn user(&self) -> Option<&SwitchyardConfig> {
        self.user.get_or_init(|| read_config(self.user_path)).as_ref()
    }

    fn entry(&self, config: Option<&SwitchyardConfig>) -> Option<String> {
        let models = &config?.models;
        let table = match self.prompt_type {
            PromptType::Agent => &models.agents,
            PromptType::Command => &models.commands,
            PromptType::Skill => &models.skills,
            PromptType::Hook => &models.hooks,
        };
        table.get(&self.params.prompt_name).cloned()
    }
}

fn read_config(path: Option<&Path>) -> Option<SwitchyardConfig> {
    let path = path.filter(|p| p.is_file())?;
    match SwitchyardConfig::load(path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable model config");
            None
        }
    }
}

type Resolver = fn(&Resolution<'_>) -> Option<String>;

fn cli_override(r: &Resolution<'_>) -> Option<String> {
    r.params.cli_override.clone()
}

fn project_entry(r: &Resolution<'_>) -> Option<String> {
    r.entry(r.project())
}

fn user_entry(r: &Resolution<'_>) -> Option<String> {
    r.entry(r.user())
}

fn project_default(r: &Resolution<'_>) -> Option<String> {
    r.project()?.models.default.clone()
}

fn user_default(r: &Resolution<'_>) -> Option<String> {
    r.user()?.models.default.clone()
}

fn frontmatter(r: &Resolution<'_>) -> Option<String> {
    r.params.frontmatter_model.clone()
}

/// Highest priority first. The literal [`DEFAULT_MODEL`] closes the chain.
const PRECEDENCE: [(&str, Resolver); 6] = [
    ("cli override", cli_override),
    ("project entry", project_entry),
    ("user entry", user_entry),
    ("project default", project_default),
    ("user default", user_default),
    ("frontmatter", frontmatter),
];

pub struct ModelRouter {
    project_root: PathBuf,
    user_config: Option<PathBuf>,
    cache: Mutex<HashMap<ResolveModelParams, String>>,
}

impl ModelRouter {
    /// Router reading the nearest project config above `project_root` and
    /// the given user config file.
    pub fn new(project_root: impl Into<PathBuf>, user_config: Option<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            user_config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Router for the current directory and the platform user config.
    pub fn from_current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(cwd, user_config_path())
    }

    pub fn resolve_model(&self, params: &ResolveModelParams) -> String {
        if let Some(cached) = self.cache.lock().get(params) {
            return cached.clone();
        }

        let resolved = self.resolve_uncached(params);
        self.cache.lock().insert(params.clone(), resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, params: &ResolveModelParams) -> String {
        let prompt_type = PromptType::from_str(&params.prompt_type).ok();
        let usable = prompt_type.filter(|_| !params.prompt_name.trim().is_empty());

        let Some(prompt_type) = usable else {
            // Malformed keys skip the config files entirely.
            return non_empty(params.cli_override.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        };

        let project_path = find_project_config(&self.project_root);
        let resolution = Resolution {
            params,
            prompt_type,
            project_path: project_path.as_deref(),
            user_path: self.user_config.as_deref(),
            project: OnceCell::new(),
            user: OnceCell::new(),
        };

        for (source, resolver) in PRECEDENCE {
            if let Some(model) = non_empty(resolver(&resolution)) {
                tracing::debug!(
                    prompt_type = %prompt_type,
                    prompt_name = %params.prompt_name,
                    source,
                    model = %model,
                    "resolved model"
                );
                return model;
            }
        }
        DEFAULT_MODEL.to_string()
    }

    /// Forget every cached resolution so on-disk changes take effect.
    pub fn invalidate_cache(&self) {
        self.cache.lock().clear();
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
