//! Plugin descriptors
//!
//! A descriptor is a small `*.settings-plugin` file installed next to a
//! plugin module. Parsing one has no side effects beyond logging: the module
//! is not touched until the plugin is first activated.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::DescriptorError;
use super::keyfile::{self, KeyFile};

/// Group that holds every descriptor key
pub const PLUGIN_GROUP: &str = "Settings Plugin";

/// File extension of descriptor files
pub const DESCRIPTOR_EXTENSION: &str = "settings-plugin";

/// The only descriptor interface age this daemon understands
pub const INTERFACE_AGE: i32 = 0;

/// Smallest priority honored from a descriptor
pub const PRIORITY_MIN: i32 = 1;

/// Priority used when none (or an out of range one) is given
pub const PRIORITY_DEFAULT: i32 = 100;

/// Identity of a plugin: the stem of its descriptor file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Create an id from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id from a descriptor path (`sound.settings-plugin` -> `sound`)
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    /// Id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Everything a descriptor file declares about a plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDescriptor {
    /// Plugin identity
    pub id: PluginId,
    /// Path of the descriptor file
    pub file: PathBuf,
    /// Module location, resolved against the descriptor's directory
    pub location: String,
    /// Display name (localized)
    pub name: String,
    /// Description (localized), empty if absent
    pub description: String,
    /// Authors, empty if absent
    pub authors: Vec<String>,
    /// Copyright line, empty if absent
    pub copyright: String,
    /// Website, empty if absent
    pub website: String,
    /// Start priority; lower starts earlier and stops later
    pub priority: i32,
}

impl PluginDescriptor {
    /// Parse a descriptor file using the locales from the environment
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        Self::from_file_with_locales(path, &keyfile::system_locales())
    }

    /// Parse a descriptor file, translating with the given locales
    pub fn from_file_with_locales(
        path: &Path,
        locales: &[String],
    ) -> Result<Self, DescriptorError> {
        let _span = tracing::debug_span!("descriptor", path = %path.display()).entered();

        let result = std::fs::read_to_string(path)
            .map_err(|source| DescriptorError::Io {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|content| Self::parse(path, &content, locales));

        match &result {
            Ok(descriptor) => tracing::debug!(
                name = %descriptor.name,
                file = %descriptor.file.display(),
                location = %descriptor.location,
                "Parsed plugin descriptor"
            ),
            Err(e) if e.is_version_mismatch() => tracing::debug!("{}", e),
            Err(e) => tracing::warn!("{}", e),
        }

        result
    }

    /// Parse descriptor content that was read from `path`
    pub fn parse(path: &Path, content: &str, locales: &[String]) -> Result<Self, DescriptorError> {
        let path_buf = path.to_path_buf();

        let file = KeyFile::parse(content).map_err(|source| DescriptorError::Syntax {
            path: path_buf.clone(),
            source,
        })?;

        if !file.has_key(PLUGIN_GROUP, "IAge") {
            return Err(DescriptorError::MissingInterfaceAge { path: path_buf });
        }
        if file.get_integer(PLUGIN_GROUP, "IAge") != Some(INTERFACE_AGE) {
            return Err(DescriptorError::UnsupportedInterfaceAge {
                path: path_buf,
                expected: INTERFACE_AGE,
                found: file.get_string(PLUGIN_GROUP, "IAge").unwrap_or_default(),
            });
        }

        let location = file
            .get_string(PLUGIN_GROUP, "Module")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DescriptorError::MissingModule {
                path: path_buf.clone(),
            })?;

        let name = file
            .get_locale_string(PLUGIN_GROUP, "Name", locales)
            .ok_or_else(|| DescriptorError::MissingName {
                path: path_buf.clone(),
            })?;

        let description = optional(
            file.get_locale_string(PLUGIN_GROUP, "Description", locales),
            "Description",
            path,
        );
        let authors = optional(file.get_string_list(PLUGIN_GROUP, "Authors"), "Authors", path);
        let copyright = optional(file.get_string(PLUGIN_GROUP, "Copyright"), "Copyright", path);
        let website = optional(file.get_string(PLUGIN_GROUP, "Website"), "Website", path);

        let priority = file
            .get_integer(PLUGIN_GROUP, "Priority")
            .filter(|p| *p >= PRIORITY_MIN)
            .unwrap_or(PRIORITY_DEFAULT);

        let id = PluginId::from_path(path).unwrap_or_else(|| PluginId::new(location.clone()));

        Ok(Self {
            id,
            file: path_buf,
            location,
            name,
            description,
            authors,
            copyright,
            website,
            priority,
        })
    }

    /// Directory the module location is resolved against
    pub fn module_dir(&self) -> &Path {
        self.file.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn optional<T: Default>(value: Option<T>, key: &str, path: &Path) -> T {
    value.unwrap_or_else(|| {
        tracing::debug!("Could not find '{}' in {}", key, path.display());
        T::default()
    })
}
