//! Test doubles for the plugin lifecycle

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use settingsd_plugin_api::{ModuleRegistration, Plugin, PluginError};

use super::descriptor::PluginDescriptor;
use super::error::LoadError;
use super::loader::{ModuleHandle, ModuleLoader, StaticLoader};

/// Records every hook call as `"<hook>:<location>"`
struct Recorder {
    location: String,
    log: Arc<Mutex<Vec<String>>>,
    refuse: bool,
    panic: bool,
}

impl Plugin for Recorder {
    fn activate(&mut self) -> Result<(), PluginError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("activate:{}", self.location));
        if self.panic {
            panic!("plugin {} exploded", self.location);
        }
        if self.refuse {
            return Err(PluginError::custom("refused"));
        }
        Ok(())
    }

    fn deactivate(&mut self) {
        self.log
            .lock()
            .unwrap()
            .push(format!("deactivate:{}", self.location));
    }
}

fn placeholder(_: &ModuleRegistration) -> Box<dyn Plugin> {
    unreachable!("FakeLoader creates instances itself")
}

/// Loader that counts open attempts and hands out [`Recorder`] plugins
#[derive(Default)]
pub(crate) struct FakeLoader {
    opens: AtomicUsize,
    missing: HashSet<String>,
    refusing: HashSet<String>,
    panicking: HashSet<String>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeLoader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opening `location` fails
    pub(crate) fn missing(mut self, location: &str) -> Self {
        self.missing.insert(location.to_string());
        self
    }

    /// The plugin at `location` returns an error from activate
    pub(crate) fn refusing(mut self, location: &str) -> Self {
        self.refusing.insert(location.to_string());
        self
    }

    /// The plugin at `location` panics in activate
    pub(crate) fn panicking(mut self, location: &str) -> Self {
        self.panicking.insert(location.to_string());
        self
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl ModuleLoader for FakeLoader {
    fn open(&self, path: &Path, location: &str) -> Result<ModuleHandle, LoadError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(location) {
            return Err(LoadError::UnknownModule {
                location: location.to_string(),
            });
        }
        StaticLoader::new().with(location, placeholder).open(path, location)
    }

    fn instantiate(&self, handle: &ModuleHandle) -> Result<Box<dyn Plugin>, LoadError> {
        let location = handle.registration().location.clone();
        Ok(Box::new(Recorder {
            refuse: self.refusing.contains(&location),
            panic: self.panicking.contains(&location),
            location,
            log: Arc::clone(&self.log),
        }))
    }
}

/// Descriptor for `<id>.settings-plugin` in `/plugins` with module `<id>`
pub(crate) fn descriptor(id: &str, priority: i32) -> PluginDescriptor {
    let content = format!(
        "[Settings Plugin]\nIAge=0\nModule={id}\nName={id} plugin\nPriority={priority}\n"
    );
    PluginDescriptor::parse(
        Path::new(&format!("/plugins/{id}.settings-plugin")),
        &content,
        &[],
    )
    .unwrap()
}
