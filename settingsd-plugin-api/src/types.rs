//! Types shared between the daemon and plugin modules

use std::path::{Path, PathBuf};

/// Handle passed to a module's factory entry point.
///
/// Identifies the module being registered: the resolved library path and the
/// `Module` location from the descriptor it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRegistration {
    /// Resolved path of the loadable unit
    pub path: PathBuf,
    /// Module location as declared in the descriptor
    pub location: String,
}

impl ModuleRegistration {
    /// Create a registration handle
    pub fn new(path: PathBuf, location: impl Into<String>) -> Self {
        Self {
            path,
            location: location.into(),
        }
    }

    /// Directory the module was loaded from
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}
