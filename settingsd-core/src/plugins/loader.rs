//! Module loaders
//!
//! A [`ModuleLoader`] turns a module location from a descriptor into a
//! [`ModuleHandle`] and creates the plugin instance from it. Two loaders are
//! provided:
//!
//! - [`DynamicLoader`] opens shared libraries built with
//!   `settingsd_plugin_api::export_plugin!`
//! - [`StaticLoader`] maps module locations to factory functions compiled into
//!   the daemon, for deployments without runtime code loading
//!
//! Modules are never unloaded. Code and vtables of a plugin instance live in
//! its library, and the instance is kept for the whole process lifetime, so
//! the library stays mapped even after its handle is dropped.

use libloading::Library;
use std::collections::HashMap;
use std::fmt;
use std::mem::ManuallyDrop;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use settingsd_plugin_api::{
    API_VERSION, API_VERSION_SYMBOL, ApiVersionFn, CREATE_SYMBOL, CreateFn, ModuleRegistration,
    Plugin,
};

use super::error::LoadError;

/// Factory for a statically registered module
pub type PluginFactory = fn(&ModuleRegistration) -> Box<dyn Plugin>;

enum ModuleKind {
    /// Never closed
    Library(ManuallyDrop<Library>),
    Static(PluginFactory),
}

/// An opened module
pub struct ModuleHandle {
    registration: ModuleRegistration,
    kind: ModuleKind,
}

impl ModuleHandle {
    /// Resolved path of the module
    pub fn path(&self) -> &Path {
        &self.registration.path
    }

    /// Registration handle passed to the module's factory
    pub fn registration(&self) -> &ModuleRegistration {
        &self.registration
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ModuleKind::Library(_) => "library",
            ModuleKind::Static(_) => "static",
        };
        f.debug_struct("ModuleHandle")
            .field("path", &self.registration.path)
            .field("location", &self.registration.location)
            .field("kind", &kind)
            .finish()
    }
}

/// Resolves module locations and creates plugin instances
pub trait ModuleLoader: Send + Sync {
    /// Path of the loadable unit for `location` in `dir`.
    ///
    /// Defaults to the platform library naming convention
    /// (`lib<location>.so`, `lib<location>.dylib`, `<location>.dll`).
    fn module_path(&self, dir: &Path, location: &str) -> PathBuf {
        dir.join(libloading::library_filename(location))
    }

    /// Open the module at `path`. Failures leave nothing behind.
    fn open(&self, path: &Path, location: &str) -> Result<ModuleHandle, LoadError>;

    /// Create the plugin instance from an opened module
    fn instantiate(&self, handle: &ModuleHandle) -> Result<Box<dyn Plugin>, LoadError>;
}

/// Loads plugin modules from shared libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLoader;

impl DynamicLoader {
    /// Create a dynamic loader
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for DynamicLoader {
    fn open(&self, path: &Path, location: &str) -> Result<ModuleHandle, LoadError> {
        // SAFETY: Modules come from the daemon's own plugin directories and
        // are expected to follow the export_plugin! contract.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: The symbol type matches the function generated by export_plugin!.
        let api_version_fn = unsafe { library.get::<ApiVersionFn>(API_VERSION_SYMBOL) }
            .map_err(|_| missing_symbol(path, API_VERSION_SYMBOL))?;

        let found = api_version_fn();
        if found != API_VERSION {
            return Err(LoadError::ApiVersionMismatch {
                path: path.to_path_buf(),
                expected: API_VERSION,
                found,
            });
        }

        // SAFETY: Only checks that the factory is exported; it is called in instantiate.
        unsafe { library.get::<CreateFn>(CREATE_SYMBOL) }
            .map_err(|_| missing_symbol(path, CREATE_SYMBOL))?;

        Ok(ModuleHandle {
            registration: ModuleRegistration::new(path.to_path_buf(), location),
            kind: ModuleKind::Library(ManuallyDrop::new(library)),
        })
    }

    fn instantiate(&self, handle: &ModuleHandle) -> Result<Box<dyn Plugin>, LoadError> {
        let ModuleKind::Library(library) = &handle.kind else {
            return Err(LoadError::ForeignHandle {
                path: handle.path().to_path_buf(),
            });
        };

        // SAFETY: The symbol type matches the function generated by export_plugin!.
        let create_fn = unsafe { library.get::<CreateFn>(CREATE_SYMBOL) }
            .map_err(|_| missing_symbol(handle.path(), CREATE_SYMBOL))?;

        // The entry point catches constructor panics and returns null instead
        let raw = create_fn(handle.registration());
        if raw.is_null() {
            return Err(LoadError::NullInstance {
                path: handle.path().to_path_buf(),
            });
        }

        // SAFETY: The pointer comes from Box::into_raw in export_plugin!.
        Ok(unsafe { Box::from_raw(raw) })
    }
}

fn missing_symbol(path: &Path, symbol: &[u8]) -> LoadError {
    LoadError::MissingSymbol {
        path: path.to_path_buf(),
        symbol: String::from_utf8_lossy(symbol).into_owned(),
    }
}

/// Compile-time registration table of plugin factories
#[derive(Default)]
pub struct StaticLoader {
    factories: HashMap<String, PluginFactory>,
}

impl StaticLoader {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a module location
    pub fn register(&mut self, location: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(location.into(), factory);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, location: impl Into<String>, factory: PluginFactory) -> Self {
        self.register(location, factory);
        self
    }

    /// Check whether a location is registered
    pub fn contains(&self, location: &str) -> bool {
        self.factories.contains_key(location)
    }
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut locations: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        locations.sort_unstable();
        f.debug_struct("StaticLoader")
            .field("locations", &locations)
            .finish()
    }
}

impl ModuleLoader for StaticLoader {
    fn open(&self, path: &Path, location: &str) -> Result<ModuleHandle, LoadError> {
        let factory = self
            .factories
            .get(location)
            .copied()
            .ok_or_else(|| LoadError::UnknownModule {
                location: location.to_string(),
            })?;

        Ok(ModuleHandle {
            registration: ModuleRegistration::new(path.to_path_buf(), location),
            kind: ModuleKind::Static(factory),
        })
    }

    fn instantiate(&self, handle: &ModuleHandle) -> Result<Box<dyn Plugin>, LoadError> {
        let ModuleKind::Static(factory) = handle.kind else {
            return Err(LoadError::ForeignHandle {
                path: handle.path().to_path_buf(),
            });
        };

        std::panic::catch_unwind(AssertUnwindSafe(|| factory(handle.registration()))).map_err(
            |_| LoadError::FactoryPanicked {
                path: handle.path().to_path_buf(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settingsd_plugin_api::PluginError;
    use tempfile::TempDir;

    struct Noop;

    impl Plugin for Noop {
        fn activate(&mut self) -> Result<(), PluginError> {
            Ok(())
        }

        fn deactivate(&mut self) {}
    }

    fn noop_factory(_: &ModuleRegistration) -> Box<dyn Plugin> {
        Box::new(Noop)
    }

    fn panicking_factory(_: &ModuleRegistration) -> Box<dyn Plugin> {
        panic!("factory exploded")
    }

    #[test]
    fn test_module_path_uses_platform_naming() {
        let path = DynamicLoader::new().module_path(Path::new("/usr/lib/settingsd"), "sound");
        let expected = if cfg!(target_os = "windows") {
            "sound.dll"
        } else if cfg!(target_os = "macos") {
            "libsound.dylib"
        } else {
            "libsound.so"
        };
        assert_eq!(path, Path::new("/usr/lib/settingsd").join(expected));
    }

    #[test]
    fn test_dynamic_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("libmissing.so");
        let err = DynamicLoader::new().open(&path, "missing").unwrap_err();
        assert!(matches!(err, LoadError::Library { .. }));
        assert!(err.to_string().contains("libmissing.so"));
    }

    #[test]
    fn test_dynamic_open_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("libgarbage.so");
        std::fs::write(&path, b"definitely not a shared object").unwrap();
        let err = DynamicLoader::new().open(&path, "garbage").unwrap_err();
        assert!(matches!(err, LoadError::Library { .. }));
    }

    #[test]
    fn test_static_open_and_instantiate() {
        let loader = StaticLoader::new().with("noop", noop_factory);
        assert!(loader.contains("noop"));

        let handle = loader.open(Path::new("/p/libnoop.so"), "noop").unwrap();
        assert_eq!(handle.path(), Path::new("/p/libnoop.so"));
        assert_eq!(handle.registration().location, "noop");

        let mut plugin = loader.instantiate(&handle).unwrap();
        plugin.activate().unwrap();
        plugin.deactivate();
    }

    #[test]
    fn test_static_unknown_location() {
        let loader = StaticLoader::new();
        let err = loader.open(Path::new("/p/libx.so"), "x").unwrap_err();
        assert!(matches!(err, LoadError::UnknownModule { ref location } if location == "x"));
    }

    #[test]
    fn test_static_factory_panic_is_caught() {
        let loader = StaticLoader::new().with("boom", panicking_factory);
        let handle = loader.open(Path::new("/p/libboom.so"), "boom").unwrap();
        let err = loader.instantiate(&handle).err().unwrap();
        assert!(matches!(err, LoadError::FactoryPanicked { .. }));
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let handle = StaticLoader::new()
            .with("noop", noop_factory)
            .open(Path::new("/p/libnoop.so"), "noop")
            .unwrap();
        let err = DynamicLoader::new().instantiate(&handle).err().unwrap();
        assert!(matches!(err, LoadError::ForeignHandle { .. }));
    }

    #[test]
    fn test_handle_debug_shows_kind() {
        let handle = StaticLoader::new()
            .with("noop", noop_factory)
            .open(Path::new("/p/libnoop.so"), "noop")
            .unwrap();
        let debug = format!("{:?}", handle);
        assert!(debug.contains("static"));
        assert!(debug.contains("noop"));
    }
}
