//! settingsd-plugin-api - Plugin API for the settingsd session daemon
//!
//! This crate provides the trait and types needed to write feature plugins for
//! settingsd. A plugin is a native Rust dynamic library that the daemon loads
//! lazily the first time the plugin is activated, and then toggles on and off
//! as its `active` setting changes.
//!
//! # Example
//!
//! ```ignore
//! use settingsd_plugin_api::{Plugin, PluginError, export_plugin};
//!
//! #[derive(Default)]
//! pub struct HousekeepingPlugin {
//!     running: bool,
//! }
//!
//! impl Plugin for HousekeepingPlugin {
//!     fn activate(&mut self) -> Result<(), PluginError> {
//!         self.running = true;
//!         Ok(())
//!     }
//!
//!     fn deactivate(&mut self) {
//!         self.running = false;
//!     }
//! }
//!
//! export_plugin!(HousekeepingPlugin);
//! ```
//!
//! Next to the library, the plugin ships a descriptor file
//! (`housekeeping.settings-plugin`):
//!
//! ```text
//! [Settings Plugin]
//! IAge=0
//! Module=housekeeping
//! Name=Housekeeping
//! Priority=5
//! ```

pub mod error;
pub mod types;

pub use error::PluginError;
pub use types::ModuleRegistration;

/// Current plugin API version. Plugins must match this exactly.
/// This is checked when a module is opened, before the factory is called.
pub const API_VERSION: u32 = 1;

/// Name of the factory entry point generated by [`export_plugin!`].
pub const CREATE_SYMBOL: &[u8] = b"_settingsd_plugin_create";

/// Name of the API version entry point generated by [`export_plugin!`].
pub const API_VERSION_SYMBOL: &[u8] = b"_settingsd_plugin_api_version";

/// Signature of the factory entry point.
#[allow(improper_ctypes_definitions)]
pub type CreateFn = extern "C" fn(&ModuleRegistration) -> *mut dyn Plugin;

/// Signature of the API version entry point.
pub type ApiVersionFn = extern "C" fn() -> u32;

/// The capability set every plugin implements.
///
/// One instance is created per plugin for the life of the daemon and is
/// reused across activate/deactivate cycles, so `deactivate` must leave the
/// plugin ready to be activated again.
pub trait Plugin: Send {
    /// Start doing whatever the plugin does.
    ///
    /// Returning an error leaves the plugin inactive; the daemon logs the
    /// error and keeps running.
    fn activate(&mut self) -> Result<(), PluginError>;

    /// Stop doing whatever the plugin does.
    ///
    /// Deactivation cannot fail from the daemon's point of view. Plugins
    /// report their own trouble through logging.
    fn deactivate(&mut self);
}

/// Export a plugin type for dynamic loading.
///
/// This macro generates the C ABI entry points that settingsd uses to check
/// compatibility and create the single plugin instance.
///
/// # Usage
///
/// ```ignore
/// // Construct via `Default`
/// settingsd_plugin_api::export_plugin!(MyPlugin);
///
/// // Construct from the module registration handle
/// settingsd_plugin_api::export_plugin!(MyPlugin, |reg| MyPlugin::new(&reg.location));
/// ```
///
/// # Generated Functions
///
/// - `_settingsd_plugin_create()`: Creates the plugin instance, or returns null
///   if the constructor panics
/// - `_settingsd_plugin_api_version()`: Returns the API version
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        $crate::export_plugin!($plugin_type, |_registration| {
            <$plugin_type>::default()
        });
    };
    ($plugin_type:ty, $constructor:expr) => {
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _settingsd_plugin_create(
            registration: &$crate::ModuleRegistration,
        ) -> *mut dyn $crate::Plugin {
            let construct: fn(&$crate::ModuleRegistration) -> $plugin_type = $constructor;
            // Panics cannot unwind through extern "C"; a null instance is a load failure
            match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                construct(registration)
            })) {
                Ok(plugin) => {
                    let plugin: Box<dyn $crate::Plugin> = Box::new(plugin);
                    Box::into_raw(plugin)
                }
                Err(_) => ::std::ptr::null_mut::<$plugin_type>() as *mut dyn $crate::Plugin,
            }
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _settingsd_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }
    };
}
