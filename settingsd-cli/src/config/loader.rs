use super::types::{
    PluginsConfig, RawPluginsConfig, RawSettingsConfig, RawSettingsdConfig, SettingsConfig,
    SettingsdConfig, default_settings_file,
};
use anyhow::{Context, Result};
use settingsd_core::plugins::DEFAULT_SCHEMA_PREFIX;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<SettingsdConfig> {
        Self::load_layers(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Load and merge a user and a project config file; missing files are skipped
    pub fn load_layers(user_path: &Path, project_path: &Path) -> Result<SettingsdConfig> {
        let mut raw = RawSettingsdConfig::default();

        // Layer 1: User config
        if let Some(user_config) = Self::read_raw(user_path)? {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_raw(project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        // Convert to final config with defaults applied
        Ok(Self::finalize(raw))
    }

    /// Get user config path (`$XDG_CONFIG_HOME/settingsd/config.toml`)
    pub fn user_config_path() -> PathBuf {
        settingsd_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with SETTINGSD_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("SETTINGSD_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".settingsd/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<Option<RawSettingsdConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawSettingsdConfig, overlay: RawSettingsdConfig) -> RawSettingsdConfig {
        RawSettingsdConfig {
            plugins: RawPluginsConfig {
                dirs: overlay.plugins.dirs.or(base.plugins.dirs),
                schema_prefix: overlay.plugins.schema_prefix.or(base.plugins.schema_prefix),
            },
            settings: RawSettingsConfig {
                file: overlay.settings.file.or(base.settings.file),
                watch: overlay.settings.watch.or(base.settings.watch),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawSettingsdConfig) -> SettingsdConfig {
        SettingsdConfig {
            plugins: PluginsConfig {
                dirs: raw.plugins.dirs.unwrap_or_default(),
                schema_prefix: raw
                    .plugins
                    .schema_prefix
                    .unwrap_or_else(|| DEFAULT_SCHEMA_PREFIX.to_string()),
            },
            settings: SettingsConfig {
                file: raw.settings.file.unwrap_or_else(default_settings_file),
                watch: raw.settings.watch.unwrap_or(true),
            },
        }
    }
}
