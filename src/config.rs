//! User settings persisted as JSON

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::services::debounce::DebounceConfig;

const CONFIG_FILE: &str = "settings.json";
const CONFIG_FOLDER: &str = "gitmind";

/// External diff or merge tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSettings {
    /// Executable to launch
    pub path: String,

    /// Argument template, e.g. `$LOCAL $REMOTE`
    #[serde(default)]
    pub arguments: String,
}

impl ToolSettings {
    /// Expand the argument template into individual arguments
    pub fn expand_arguments(
        &self,
        local: &Path,
        remote: &Path,
        base: Option<&Path>,
        merged: Option<&Path>,
    ) -> Vec<String> {
        let display = |p: Option<&Path>| p.map(|p| p.display().to_string()).unwrap_or_default();
        let local = local.display().to_string();
        let remote = remote.display().to_string();
        let base = display(base);
        let merged = display(merged);

        split_arguments(&self.arguments)
            .into_iter()
            .map(|arg| {
                arg.replace("$LOCAL", &local)
                    .replace("$REMOTE", &remote)
                    .replace("$BASE", &base)
                    .replace("$MERGED", &merged)
            })
            .collect()
    }
}

/// Split on whitespace, keeping double-quoted sections together
fn split_arguments(template: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in template.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// Folder monitor timings in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub min_quiet_ms: u64,
    pub max_wait_ms: u64,
    pub quiet_end_ms: u64,
    pub tick_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let config = DebounceConfig::default();
        Self {
            min_quiet_ms: config.min_quiet.as_millis() as u64,
            max_wait_ms: config.max_wait.as_millis() as u64,
            quiet_end_ms: config.quiet_end.as_millis() as u64,
            tick_ms: config.tick.as_millis() as u64,
        }
    }
}

impl MonitorSettings {
    pub fn debounce_config(&self) -> DebounceConfig {
        DebounceConfig {
            min_quiet: Duration::from_millis(self.min_quiet_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
            quiet_end: Duration::from_millis(self.quiet_end_ms),
            // A zero interval would panic in tokio
            tick: Duration::from_millis(self.tick_ms.max(1)),
        }
    }
}

fn default_theme() -> String {
    "dark".to_string()
}

/// Complete user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_tool: Option<ToolSettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_tool: Option<ToolSettings>,

    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(default)]
    pub monitor: MonitorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            diff_tool: None,
            merge_tool: None,
            theme: default_theme(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl Settings {
    /// Per-user settings folder
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FOLDER))
    }

    /// Load settings from disk, falling back to defaults when absent
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save settings to disk
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(config_dir.join(CONFIG_FILE), contents)?;
        Ok(())
    }
}
