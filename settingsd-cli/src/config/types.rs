use serde::{Deserialize, Serialize};
use settingsd_core::RegistryConfig;
use settingsd_core::plugins::DEFAULT_SCHEMA_PREFIX;
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSettingsdConfig {
    #[serde(default)]
    pub plugins: RawPluginsConfig,

    #[serde(default)]
    pub settings: RawSettingsConfig,
}

/// Plugin config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPluginsConfig {
    /// Extra descriptor directories, searched before the default ones
    pub dirs: Option<Vec<PathBuf>>,

    /// Prefix of per-plugin settings schemas
    pub schema_prefix: Option<String>,
}

/// Settings store config as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSettingsConfig {
    /// Settings file holding each plugin's `active` and `priority` keys
    pub file: Option<PathBuf>,

    /// Reload the settings file when it changes on disk
    pub watch: Option<bool>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsdConfig {
    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    pub dirs: Vec<PathBuf>,
    pub schema_prefix: String,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            schema_prefix: DEFAULT_SCHEMA_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    pub file: PathBuf,
    pub watch: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            file: default_settings_file(),
            watch: true,
        }
    }
}

/// `$XDG_CONFIG_HOME/settingsd/settings.toml`
pub fn default_settings_file() -> PathBuf {
    settingsd_paths::config_dir().join("settings.toml")
}

impl SettingsdConfig {
    /// Registry configuration: configured directories first, then the
    /// default plugin directories
    pub fn registry_config(&self) -> RegistryConfig {
        let mut plugin_dirs = self.plugins.dirs.clone();
        for dir in settingsd_paths::plugin_dirs() {
            if !plugin_dirs.contains(&dir) {
                plugin_dirs.push(dir);
            }
        }
        RegistryConfig {
            plugin_dirs,
            schema_prefix: self.plugins.schema_prefix.clone(),
        }
    }
}
