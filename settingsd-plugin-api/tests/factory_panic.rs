//! Entry points generated by `export_plugin!` for a constructor that panics

use settingsd_plugin_api::{ModuleRegistration, Plugin, PluginError, export_plugin};
use std::path::PathBuf;

struct Exploding;

impl Exploding {
    fn new(_registration: &ModuleRegistration) -> Self {
        panic!("constructor failed")
    }
}

impl Plugin for Exploding {
    fn activate(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn deactivate(&mut self) {}
}

export_plugin!(Exploding, |registration| Exploding::new(registration));

#[test]
fn constructor_panic_returns_null_instance() {
    let registration = ModuleRegistration::new(PathBuf::from("/tmp/libexploding.so"), "exploding");

    let result = std::panic::catch_unwind(|| _settingsd_plugin_create(&registration));

    let raw = result.expect("panic escaped the entry point");
    assert!(raw.is_null());
}

#[test]
fn api_version_entry_point_still_exported() {
    assert_eq!(
        _settingsd_plugin_api_version(),
        settingsd_plugin_api::API_VERSION
    );
}
