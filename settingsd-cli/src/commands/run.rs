//! Run the settings daemon
//!
//! Discovers plugins, starts the enabled ones in priority order and then
//! follows the settings file until interrupted.

use anyhow::{Context, Result};
use clap::Args;
use settingsd_core::{DynamicLoader, PluginRegistry, TomlSettings};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SettingsdConfig;

/// Arguments for the run command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not watch the settings file for changes
    #[arg(long)]
    pub no_watch: bool,
}

/// Run the daemon until Ctrl-C
pub async fn run(args: RunArgs, config: &SettingsdConfig) -> Result<()> {
    let settings = Arc::new(
        TomlSettings::open(&config.settings.file).with_context(|| {
            format!(
                "Failed to open settings file {}",
                config.settings.file.display()
            )
        })?,
    );

    if config.settings.watch && !args.no_watch {
        settings
            .watch_file()
            .context("Failed to watch settings file")?;
    }

    let mut registry = PluginRegistry::new(
        config.registry_config(),
        Arc::new(DynamicLoader::new()),
        settings,
    );
    registry.load_all();

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupted"),
                Err(e) => tracing::error!(error = %e, "Cannot listen for Ctrl-C"),
            }
            shutdown.cancel();
        }
    });

    info!(
        plugins = registry.plugin_count(),
        settings = %config.settings.file.display(),
        "settingsd running"
    );
    let report = registry.run(shutdown).await;

    if !report.failed.is_empty() {
        let failed: Vec<&str> = report.failed.iter().map(|id| id.as_str()).collect();
        tracing::warn!(plugins = %failed.join(", "), "Some plugins failed to start");
    }

    Ok(())
}
