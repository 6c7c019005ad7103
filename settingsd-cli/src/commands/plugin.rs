//! Plugin management commands
//!
//! These only read descriptors and the settings file; no plugin module is
//! loaded. `enable` and `disable` write the plugin's `active` key, which a
//! running daemon picks up through its settings watcher.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use settingsd_core::{
    DynamicLoader, ENABLED_KEY, ModuleLoader, PluginInfo, PluginRegistry, TomlSettings,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SettingsdConfig;

/// Plugin subcommands
#[derive(Subcommand)]
pub enum PluginCommands {
    /// List discovered plugins in start order
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show plugin details
    Info {
        /// Plugin id (descriptor file name without extension)
        id: String,
    },
    /// Enable a plugin
    Enable {
        /// Plugin id to enable
        id: String,
    },
    /// Disable a plugin
    Disable {
        /// Plugin id to disable
        id: String,
    },
}

/// One row of `settingsd list`
#[derive(Debug, Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub priority: i32,
    pub enabled: bool,
    pub file: PathBuf,
}

impl From<&PluginInfo> for PluginSummary {
    fn from(info: &PluginInfo) -> Self {
        Self {
            id: info.id().to_string(),
            name: info.name().to_string(),
            description: info.description().to_string(),
            priority: info.priority(),
            enabled: info.is_enabled(),
            file: info.file().to_path_buf(),
        }
    }
}

/// Run plugin command
pub fn run(command: PluginCommands, config: &SettingsdConfig) -> Result<()> {
    match command {
        PluginCommands::List { json } => list_plugins(config, json),
        PluginCommands::Info { id } => show_plugin_info(config, &id),
        PluginCommands::Enable { id } => set_enabled(config, &id, true),
        PluginCommands::Disable { id } => set_enabled(config, &id, false),
    }
}

/// Discover plugins and bind them to the configured settings file
fn discover(config: &SettingsdConfig) -> Result<(PluginRegistry, Arc<TomlSettings>)> {
    let settings = Arc::new(TomlSettings::open(&config.settings.file).with_context(|| {
        format!(
            "Failed to open settings file {}",
            config.settings.file.display()
        )
    })?);
    let mut registry = PluginRegistry::new(
        config.registry_config(),
        Arc::new(DynamicLoader::new()),
        settings.clone(),
    );
    registry.load_all();
    Ok((registry, settings))
}

fn list_plugins(config: &SettingsdConfig, json: bool) -> Result<()> {
    let (registry, _) = discover(config)?;
    let summaries: Vec<PluginSummary> = registry.plugins().iter().map(Into::into).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No plugins installed");
        println!();
        println!("Plugin directories:");
        for dir in &registry.config().plugin_dirs {
            println!("  {}", dir.display());
        }
        println!();
        println!("To install a plugin, copy its library and its .settings-plugin");
        println!("descriptor into one of these directories, then run:");
        println!("  settingsd enable <id>");
        return Ok(());
    }

    print!("{}", format_list(&summaries));
    Ok(())
}

/// Render the plugin table, one plugin per line
pub fn format_list(summaries: &[PluginSummary]) -> String {
    let width = summaries.iter().map(|s| s.id.len()).max().unwrap_or(0);
    let mut out = String::new();

    for s in summaries {
        let status = if s.enabled { "✓" } else { "○" };
        let description = if s.description.is_empty() {
            "No description"
        } else {
            &s.description
        };
        let _ = writeln!(
            out,
            "{} {:<width$}  {:>4}  {}",
            status,
            s.id,
            s.priority,
            description,
            width = width
        );
    }

    out
}

fn show_plugin_info(config: &SettingsdConfig, id: &str) -> Result<()> {
    let (registry, _) = discover(config)?;
    match registry.get(id) {
        Some(info) => print!("{}", format_info(info, &DynamicLoader::new())),
        None => {
            println!("Plugin '{}' not found", id);
            println!();
            println!("Run 'settingsd list' to see all plugins.");
        }
    }
    Ok(())
}

fn or_none(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Render everything known about one plugin
pub fn format_info(info: &PluginInfo, loader: &dyn ModuleLoader) -> String {
    let module_path = loader.module_path(info.descriptor().module_dir(), info.location());
    let authors = info.authors().join(", ");

    let mut out = String::new();
    let _ = writeln!(out, "Name:        {}", info.name());
    let _ = writeln!(out, "Id:          {}", info.id());
    let _ = writeln!(out, "Description: {}", or_none(info.description()));
    let _ = writeln!(out, "Authors:     {}", or_none(&authors));
    let _ = writeln!(out, "Copyright:   {}", or_none(info.copyright()));
    let _ = writeln!(out, "Website:     {}", or_none(info.website()));
    let _ = writeln!(out);
    let _ = writeln!(out, "Descriptor:  {}", info.file().display());
    let _ = writeln!(out, "Module:      {}", module_path.display());
    let _ = writeln!(out, "Priority:    {}", info.priority());
    let _ = writeln!(out, "Schema:      {}", info.schema().unwrap_or("-"));
    let _ = writeln!(
        out,
        "Status:      {}",
        if info.is_enabled() { "Enabled" } else { "Disabled" }
    );
    out
}

fn set_enabled(config: &SettingsdConfig, id: &str, enabled: bool) -> Result<()> {
    let (registry, settings) = discover(config)?;
    let info = registry.require(id)?;
    let schema = registry.config().schema_for(info.id());

    settings
        .set_bool(&schema, ENABLED_KEY, enabled)
        .with_context(|| format!("Failed to update {}", settings.path().display()))?;

    if enabled {
        println!("Enabled plugin: {}", id);
    } else {
        println!("Disabled plugin: {}", id);
    }
    Ok(())
}
