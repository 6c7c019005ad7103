//! Hello Plugin - A simple example plugin for settingsd
//!
//! This plugin demonstrates:
//! - Basic plugin structure with the `export_plugin!` macro
//! - Using the module registration handle in the constructor
//! - Keeping state across activate/deactivate cycles
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p ~/.local/share/settingsd/plugins
//! cp target/release/libhello.so hello.settings-plugin ~/.local/share/settingsd/plugins/
//! settingsd enable hello
//! ```

use std::path::PathBuf;

use settingsd_plugin_api::{ModuleRegistration, Plugin, PluginError, export_plugin};

/// Greets on activation and counts how often it was switched on.
pub struct HelloPlugin {
    /// Where the module was loaded from
    source: PathBuf,
    /// Number of activations since the module was loaded
    activations: u32,
    active: bool,
}

impl HelloPlugin {
    pub fn new(registration: &ModuleRegistration) -> Self {
        Self {
            source: registration.path.clone(),
            activations: 0,
            active: false,
        }
    }

    pub fn activations(&self) -> u32 {
        self.activations
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Plugin for HelloPlugin {
    fn activate(&mut self) -> Result<(), PluginError> {
        self.activations += 1;
        self.active = true;
        // The host's tracing subscriber is not shared with cdylib plugins
        eprintln!(
            "[hello] Hello! (activation {} from {})",
            self.activations,
            self.source.display()
        );
        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = false;
        eprintln!("[hello] Goodbye after {} activation(s)", self.activations);
    }
}

export_plugin!(HelloPlugin, |registration| HelloPlugin::new(registration));
