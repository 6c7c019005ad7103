//! Plugin error types

use std::path::PathBuf;
use thiserror::Error;

use super::keyfile::KeyFileError;

/// Errors that reject a plugin descriptor
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// Descriptor file could not be read
    #[error("Cannot read plugin descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Descriptor is not a valid grouped key-value document
    #[error("Bad plugin descriptor {path}: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: KeyFileError,
    },

    /// The interface age key is missing
    #[error("IAge key does not exist in {path}")]
    MissingInterfaceAge { path: PathBuf },

    /// The descriptor was written for an incompatible daemon
    #[error("Wrong IAge in {path}: expected {expected}, found '{found}'")]
    UnsupportedInterfaceAge {
        path: PathBuf,
        expected: i32,
        found: String,
    },

    /// No module location
    #[error("Could not find 'Module' in {path}")]
    MissingModule { path: PathBuf },

    /// No display name
    #[error("Could not find 'Name' in {path}")]
    MissingName { path: PathBuf },
}

impl DescriptorError {
    /// Version mismatches are expected when several daemon versions share a
    /// plugin directory, so they are not worth a warning.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(
            self,
            Self::MissingInterfaceAge { .. } | Self::UnsupportedInterfaceAge { .. }
        )
    }
}

/// Errors from opening a module or creating its plugin instance
#[derive(Error, Debug)]
pub enum LoadError {
    /// Failed to load dynamic library
    #[error("Failed to load plugin library {path}: {source}")]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required entry point is not exported
    #[error("Plugin library {path} does not export '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: String },

    /// API version mismatch between settingsd and the module
    #[error("API version mismatch in {path}: settingsd expects {expected}, module has {found}")]
    ApiVersionMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// No factory registered for a module location
    #[error("No statically registered module named '{location}'")]
    UnknownModule { location: String },

    /// The entry point returned no instance, usually because its constructor panicked
    #[error("Module {path} returned no plugin instance")]
    NullInstance { path: PathBuf },

    /// The factory panicked
    #[error("Module {path} panicked while creating its plugin instance")]
    FactoryPanicked { path: PathBuf },

    /// The handle was created by a different loader
    #[error("Module handle for {path} was not created by this loader")]
    ForeignHandle { path: PathBuf },
}

/// Reasons an activation attempt failed
#[derive(Error, Debug)]
pub enum ActivationError {
    /// A previous module load failed; the plugin will not be loaded again
    #[error("Plugin '{name}' is unavailable")]
    Unavailable { name: String },

    /// The module could not be loaded
    #[error("Error activating plugin '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },

    /// The plugin's own activate hook failed
    #[error("Plugin '{name}' failed to activate: {source}")]
    Hook {
        name: String,
        #[source]
        source: settingsd_plugin_api::PluginError,
    },

    /// The plugin's activate hook panicked
    #[error("Plugin '{name}' panicked while activating")]
    Panicked { name: String },
}

/// Errors from the plugin registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A plugin directory could not be listed
    #[error("Cannot read plugin directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Plugin not found
    #[error("Plugin '{id}' not found")]
    NotFound { id: String },
}
