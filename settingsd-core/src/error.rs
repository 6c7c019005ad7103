//! Error types for settingsd-core

use thiserror::Error;

pub use crate::plugins::{ActivationError, DescriptorError, LoadError, RegistryError};
pub use crate::settings::SettingsError;

/// Top-level error type for settingsd-core
#[derive(Error, Debug)]
pub enum SettingsdError {
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Module error: {0}")]
    Load(#[from] LoadError),

    #[error("Activation error: {0}")]
    Activation(#[from] ActivationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}
