//! settingsd-core: Plugin lifecycle core for the settingsd daemon
//!
//! This crate provides the pieces the daemon is built from:
//!
//! - **Descriptors** - [`PluginDescriptor`] parsed from `*.settings-plugin` files
//! - **Module loading** - [`ModuleLoader`] with [`DynamicLoader`] for shared
//!   libraries and [`StaticLoader`] for compiled-in plugins
//! - **Lifecycle** - [`PluginInfo`], one per plugin, with lazy loading and
//!   sticky load failures
//! - **Settings** - [`SettingsBackend`] with [`TomlSettings`] and
//!   [`MemorySettings`]; each plugin follows its persisted `active` key
//! - **Registry** - [`PluginRegistry`] discovering plugins and starting them
//!   in priority order
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use settingsd_core::{DynamicLoader, PluginRegistry, RegistryConfig, TomlSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Arc::new(TomlSettings::open("/tmp/settings.toml")?);
//! settings.watch_file()?;
//!
//! let mut registry = PluginRegistry::new(
//!     RegistryConfig::default(),
//!     Arc::new(DynamicLoader::new()),
//!     settings,
//! );
//! registry.load_all();
//! registry.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   PluginRegistry                     │
//! │  ┌───────────────┐   ┌─────────────────────────────┐ │
//! │  │  PluginInfo   │──▶│ ModuleLoader (lazy, once)   │ │
//! │  │  (per plugin) │   └─────────────────────────────┘ │
//! │  └───────▲───────┘                                   │
//! │          │ SettingChange (mpsc, dispatch task)       │
//! │  ┌───────┴────────────────────────────────────────┐  │
//! │  │ SettingsBackend (TOML file + notify watcher)   │  │
//! │  └────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod plugins;
pub mod settings;

// Re-export key types for convenience
pub use error::SettingsdError;
pub use plugins::{
    ActivationError, DescriptorError, DynamicLoader, LoadError, ModuleLoader, PluginDescriptor,
    PluginEvent, PluginId, PluginInfo, PluginRegistry, PluginState, RegistryConfig,
    RegistryError, StartReport, StaticLoader,
};
pub use settings::{
    ENABLED_KEY, MemorySettings, PRIORITY_KEY, SettingChange, SettingsBackend, SettingsError,
    TomlSettings,
};
