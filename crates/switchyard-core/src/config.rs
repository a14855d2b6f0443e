//! Model-precedence configuration files
//!
//! Both the project file (`.switchyard/config.json` in the nearest ancestor
//! directory) and the user file (`<config_dir>/switchyard/config.json`) share
//! one shape. They are parsed as JSON5, so comments and trailing commas are
//! fine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{CoreError, CoreResult};

pub const PROJECT_CONFIG_DIR: &str = ".switchyard";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

/// `models` section: a source-wide default plus per-prompt entries keyed by
/// the plural prompt type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub agents: HashMap<String, String>,
    #[serde(default)]
    pub commands: HashMap<String, String>,
    #[serde(default)]
    pub skills: HashMap<String, String>,
    #[serde(default)]
    pub hooks: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl SwitchyardConfig {
    pub fn parse(content: &str) -> CoreResult<Self> {
        json5::from_str(content).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load and overlay: entries in `higher` win over `self`.
    pub fn merged_with(mut self, higher: SwitchyardConfig) -> Self {
        if higher.models.default.is_some() {
            self.models.default = higher.models.default;
        }
        self.models.agents.extend(higher.models.agents);
        self.models.commands.extend(higher.models.commands);
        self.models.skills.extend(higher.models.skills);
        self.models.hooks.extend(higher.models.hooks);
        for (name, settings) in higher.providers {
            let entry = self.providers.entry(name).or_default();
            if settings.api_key.is_some() {
                entry.api_key = settings.api_key;
            }
            if settings.base_url.is_some() {
                entry.base_url = settings.base_url;
            }
        }
        self
    }
}

/// Walk up from `start` looking for `.switchyard/config.json`.
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("switchyard").join(CONFIG_FILE_NAME))
}

/// User config overlaid with the project config; missing files are empty.
pub fn load_layered(project_root: &Path, user: Option<&Path>) -> CoreResult<SwitchyardConfig> {
    let mut config = SwitchyardConfig::default();
    if let Some(path) = user.filter(|p| p.is_file()) {
        config = config.merged_with(SwitchyardConfig::load(path)?);
    }
    if let Some(path) = find_project_config(project_root) {
        config = config.merged_with(SwitchyardConfig::load(&path)?);
    }
    Ok(config)
}
