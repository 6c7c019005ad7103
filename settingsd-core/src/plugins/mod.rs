//! Plugin system for settingsd
//!
//! This module provides everything between a descriptor file on disk and a
//! running plugin:
//!
//! - [`PluginDescriptor`]: Metadata parsed from a `*.settings-plugin` file
//! - [`ModuleLoader`]: Opens plugin modules ([`DynamicLoader`], [`StaticLoader`])
//! - [`PluginInfo`]: Lifecycle of one plugin, bound to its settings
//! - [`PluginRegistry`]: Discovers plugins and starts/stops them in priority order
//!
//! # Plugin Discovery
//!
//! Descriptors are looked up in each configured directory in turn; the first
//! directory that provides a given plugin id wins. The default directories
//! are `$XDG_DATA_HOME/settingsd/plugins` followed by
//! `<dir>/settingsd/plugins` for every entry of `$XDG_DATA_DIRS`.
//!
//! # Descriptor
//!
//! ```text
//! [Settings Plugin]
//! IAge=0
//! Module=sound
//! Name=Sound
//! Name[de]=Klang
//! Description=Applies volume and sound theme settings
//! Authors=Jane Doe;John Roe
//! Priority=5
//! ```
//!
//! `Module` is resolved next to the descriptor using the platform library
//! naming (`libsound.so` on Linux).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use settingsd_core::plugins::{DynamicLoader, PluginRegistry, RegistryConfig};
//! use settingsd_core::settings::MemorySettings;
//!
//! let mut registry = PluginRegistry::new(
//!     RegistryConfig::default(),
//!     Arc::new(DynamicLoader::new()),
//!     Arc::new(MemorySettings::new()),
//! );
//! registry.load_all();
//! let report = registry.start();
//! println!("{} plugins running", report.activated.len());
//! ```

mod descriptor;
mod error;
mod info;
pub mod keyfile;
mod loader;
mod registry;
#[cfg(test)]
mod testing;

pub use descriptor::{
    DESCRIPTOR_EXTENSION, INTERFACE_AGE, PLUGIN_GROUP, PRIORITY_DEFAULT, PRIORITY_MIN,
    PluginDescriptor, PluginId,
};
pub use error::{ActivationError, DescriptorError, LoadError, RegistryError};
pub use info::{EVENT_CAPACITY, PluginEvent, PluginInfo, PluginState};
pub use loader::{DynamicLoader, ModuleHandle, ModuleLoader, PluginFactory, StaticLoader};
pub use registry::{DEFAULT_SCHEMA_PREFIX, PluginRegistry, RegistryConfig, StartReport};
