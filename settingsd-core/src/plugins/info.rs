//! Per-plugin lifecycle
//!
//! A [`PluginInfo`] is created from one descriptor file and then driven by
//! its registry. The module is opened lazily on the first activation and is
//! kept, together with the plugin instance, for the life of the record. A
//! failed load marks the plugin unavailable for good; later activations fail
//! without touching the filesystem again.

use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

use settingsd_plugin_api::Plugin;

use super::descriptor::{PluginDescriptor, PluginId};
use super::error::{ActivationError, DescriptorError, LoadError};
use super::loader::{ModuleHandle, ModuleLoader};
use crate::settings::{ChangeSender, ENABLED_KEY, PRIORITY_KEY, SettingsBackend};

/// Capacity of event channels created by [`PluginInfo::new`]
pub const EVENT_CAPACITY: usize = 64;

/// Lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// The plugin's activate hook succeeded
    Activated(PluginId),
    /// The plugin's deactivate hook ran
    Deactivated(PluginId),
}

impl PluginEvent {
    /// Plugin the event is about
    pub fn id(&self) -> &PluginId {
        match self {
            Self::Activated(id) | Self::Deactivated(id) => id,
        }
    }
}

/// Lifecycle state of a plugin, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Module not loaded yet
    Unloaded,
    /// Module loaded, plugin not running
    Inactive,
    /// Plugin running
    Active,
    /// Module failed to load
    Unavailable,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

struct Binding {
    settings: Arc<dyn SettingsBackend>,
    schema: String,
}

/// A discovered plugin and its runtime state
pub struct PluginInfo {
    descriptor: PluginDescriptor,
    priority: i32,
    enabled: bool,
    active: bool,
    available: bool,
    load_attempts: u32,
    // Declared before `module` so the instance is dropped first
    plugin: Option<Box<dyn Plugin>>,
    module: Option<ModuleHandle>,
    loader: Arc<dyn ModuleLoader>,
    events: broadcast::Sender<PluginEvent>,
    binding: Option<Binding>,
}

impl PluginInfo {
    /// Create a record with its own event channel
    pub fn new(descriptor: PluginDescriptor, loader: Arc<dyn ModuleLoader>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::with_events(descriptor, loader, events)
    }

    /// Create a record that publishes on a shared event channel
    pub fn with_events(
        descriptor: PluginDescriptor,
        loader: Arc<dyn ModuleLoader>,
        events: broadcast::Sender<PluginEvent>,
    ) -> Self {
        Self {
            priority: descriptor.priority,
            descriptor,
            enabled: false,
            active: false,
            available: true,
            load_attempts: 0,
            plugin: None,
            module: None,
            loader,
            events,
            binding: None,
        }
    }

    /// Parse a descriptor file into a record
    pub fn from_file(path: &Path, loader: Arc<dyn ModuleLoader>) -> Result<Self, DescriptorError> {
        Ok(Self::new(PluginDescriptor::from_file(path)?, loader))
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> &PluginId {
        &self.descriptor.id
    }

    pub fn file(&self) -> &Path {
        &self.descriptor.file
    }

    pub fn location(&self) -> &str {
        &self.descriptor.location
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn authors(&self) -> &[String] {
        &self.descriptor.authors
    }

    pub fn copyright(&self) -> &str {
        &self.descriptor.copyright
    }

    pub fn website(&self) -> &str {
        &self.descriptor.website
    }

    /// Effective priority, after any settings override
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Last known persisted enabled value
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_active(&self) -> bool {
        self.available && self.active
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Number of times the module was opened (at most one unless reset)
    pub fn load_attempts(&self) -> u32 {
        self.load_attempts
    }

    /// Schema this record is bound to, if any
    pub fn schema(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.schema.as_str())
    }

    pub fn state(&self) -> PluginState {
        if !self.available {
            PluginState::Unavailable
        } else if self.active {
            PluginState::Active
        } else if self.plugin.is_some() {
            PluginState::Inactive
        } else {
            PluginState::Unloaded
        }
    }

    /// Subscribe to this record's lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    /// Start the plugin, loading its module first if needed
    pub fn activate(&mut self) -> Result<(), ActivationError> {
        if !self.available {
            return Err(ActivationError::Unavailable {
                name: self.descriptor.name.clone(),
            });
        }
        if self.active {
            return Ok(());
        }

        let mut plugin = match self.plugin.take() {
            Some(plugin) => plugin,
            None => self.load_module().map_err(|source| {
                tracing::warn!(
                    plugin = %self.descriptor.id,
                    "Error activating plugin '{}'",
                    self.descriptor.name
                );
                ActivationError::Load {
                    name: self.descriptor.name.clone(),
                    source,
                }
            })?,
        };

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| plugin.activate()));
        self.plugin = Some(plugin);

        match result {
            Ok(Ok(())) => {
                self.active = true;
                let _ = self
                    .events
                    .send(PluginEvent::Activated(self.descriptor.id.clone()));
                tracing::info!(plugin = %self.descriptor.id, "Plugin activated");
                Ok(())
            }
            Ok(Err(source)) => {
                tracing::warn!(
                    plugin = %self.descriptor.id,
                    error = %source,
                    "Plugin '{}' refused to activate",
                    self.descriptor.name
                );
                Err(ActivationError::Hook {
                    name: self.descriptor.name.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::error!(
                    plugin = %self.descriptor.id,
                    "Plugin '{}' panicked while activating",
                    self.descriptor.name
                );
                Err(ActivationError::Panicked {
                    name: self.descriptor.name.clone(),
                })
            }
        }
    }

    /// Stop the plugin. Does nothing unless it is active.
    pub fn deactivate(&mut self) {
        if !self.is_active() {
            return;
        }

        if let Some(plugin) = self.plugin.as_mut()
            && std::panic::catch_unwind(AssertUnwindSafe(|| plugin.deactivate())).is_err()
        {
            tracing::error!(
                plugin = %self.descriptor.id,
                "Plugin '{}' panicked while deactivating",
                self.descriptor.name
            );
        }

        self.active = false;
        let _ = self
            .events
            .send(PluginEvent::Deactivated(self.descriptor.id.clone()));
        tracing::info!(plugin = %self.descriptor.id, "Plugin deactivated");
    }

    /// Open the module and create the plugin instance.
    ///
    /// Any failure marks the plugin unavailable permanently.
    fn load_module(&mut self) -> Result<Box<dyn Plugin>, LoadError> {
        debug_assert!(self.available);
        debug_assert!(self.plugin.is_none());
        debug_assert!(!self.descriptor.location.is_empty());

        let path = self
            .loader
            .module_path(self.descriptor.module_dir(), &self.descriptor.location);
        let _span = tracing::debug_span!(
            "load_module",
            plugin = %self.descriptor.id,
            path = %path.display()
        )
        .entered();

        self.load_attempts += 1;

        let result = self
            .loader
            .open(&path, &self.descriptor.location)
            .and_then(|handle| {
                let plugin = self.loader.instantiate(&handle)?;
                Ok((handle, plugin))
            });

        match result {
            Ok((handle, plugin)) => {
                tracing::debug!("Loaded plugin module");
                self.module = Some(handle);
                Ok(plugin)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Cannot load plugin '{}' since file '{}' {}",
                    self.descriptor.name,
                    path.display(),
                    failure_reason(&e)
                );
                self.available = false;
                Err(e)
            }
        }
    }

    /// Bind to a persisted settings schema.
    ///
    /// Seeds the enabled flag, applies a positive priority override, and
    /// asks `settings` to report changes of the enabled key on `changes`.
    /// The priority key is only read here.
    pub fn set_schema(
        &mut self,
        settings: Arc<dyn SettingsBackend>,
        schema: impl Into<String>,
        changes: ChangeSender,
    ) {
        let schema = schema.into();

        self.enabled = match settings.get_bool(&schema, ENABLED_KEY) {
            Some(enabled) => enabled,
            None => {
                tracing::debug!(
                    plugin = %self.descriptor.id,
                    schema = %schema,
                    "No '{}' key in schema, plugin stays disabled",
                    ENABLED_KEY
                );
                false
            }
        };
        if let Some(priority) = settings.get_int(&schema, PRIORITY_KEY).filter(|p| *p > 0) {
            self.priority = i32::try_from(priority).unwrap_or(i32::MAX);
        }
        settings.watch(&schema, ENABLED_KEY, changes);

        tracing::debug!(
            plugin = %self.descriptor.id,
            schema = %schema,
            enabled = self.enabled,
            priority = self.priority,
            "Bound plugin settings"
        );
        self.binding = Some(Binding { settings, schema });
    }

    /// Apply a change notification for `key` in the bound schema
    pub fn on_settings_changed(&mut self, key: &str) {
        if key != ENABLED_KEY {
            return;
        }
        let Some(binding) = &self.binding else {
            return;
        };

        self.enabled = binding
            .settings
            .get_bool(&binding.schema, ENABLED_KEY)
            .unwrap_or(false);

        if self.enabled {
            // Failures are already logged by activate
            let _ = self.activate();
        } else {
            self.deactivate();
        }
    }
}

/// Why a module could not be loaded, phrased to follow "since file '...'"
fn failure_reason(error: &LoadError) -> &'static str {
    match error {
        LoadError::Library { .. } => "cannot be read",
        LoadError::ApiVersionMismatch { .. } => "was built for a different plugin API",
        LoadError::MissingSymbol { .. } => "does not export the plugin entry points",
        LoadError::UnknownModule { .. } => "is not a registered module",
        LoadError::NullInstance { .. } | LoadError::FactoryPanicked { .. } => {
            "failed to create the plugin instance"
        }
        LoadError::ForeignHandle { .. } => "was opened by a different loader",
    }
}

impl Drop for PluginInfo {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for PluginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInfo")
            .field("id", &self.descriptor.id)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("state", &self.state())
            .field("module", &self.module)
            .field("schema", &self.schema())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{FakeLoader, descriptor};
    use crate::settings::{MemorySettings, change_channel};
    use tokio::sync::broadcast::error::TryRecvError;

    fn info(loader: &Arc<FakeLoader>, id: &str) -> PluginInfo {
        PluginInfo::new(descriptor(id, 10), loader.clone())
    }

    fn drain(rx: &mut broadcast::Receiver<PluginEvent>) -> Vec<PluginEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_new_record_state() {
        let loader = Arc::new(FakeLoader::new());
        let info = info(&loader, "sound");

        assert_eq!(info.id().as_str(), "sound");
        assert_eq!(info.name(), "sound plugin");
        assert_eq!(info.priority(), 10);
        assert!(info.is_available());
        assert!(!info.is_active());
        assert!(!info.is_enabled());
        assert_eq!(info.state(), PluginState::Unloaded);
        assert_eq!(info.load_attempts(), 0);
        assert_eq!(loader.opens(), 0);
    }

    #[test]
    fn test_activate_twice_loads_once_and_emits_once() {
        let loader = Arc::new(FakeLoader::new());
        let mut info = info(&loader, "sound");
        let mut rx = info.subscribe();

        info.activate().unwrap();
        info.activate().unwrap();

        assert!(info.is_active());
        assert_eq!(info.state(), PluginState::Active);
        assert_eq!(loader.opens(), 1);
        assert_eq!(info.load_attempts(), 1);
        assert_eq!(loader.log(), vec!["activate:sound"]);
        assert_eq!(
            drain(&mut rx),
            vec![PluginEvent::Activated(PluginId::new("sound"))]
        );
    }

    #[test]
    fn test_deactivate_never_activated_is_silent() {
        let loader = Arc::new(FakeLoader::new());
        let mut info = info(&loader, "sound");
        let mut rx = info.subscribe();

        info.deactivate();

        assert!(!info.is_active());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(loader.log().is_empty());
    }

    #[test]
    fn test_instance_reused_across_cycles() {
        let loader = Arc::new(FakeLoader::new());
        let mut info = info(&loader, "sound");
        let mut rx = info.subscribe();

        info.activate().unwrap();
        info.deactivate();
        assert_eq!(info.state(), PluginState::Inactive);
        info.activate().unwrap();

        assert_eq!(loader.opens(), 1);
        assert_eq!(
            loader.log(),
            vec!["activate:sound", "deactivate:sound", "activate:sound"]
        );
        let id = PluginId::new("sound");
        assert_eq!(
            drain(&mut rx),
            vec![
                PluginEvent::Activated(id.clone()),
                PluginEvent::Deactivated(id.clone()),
                PluginEvent::Activated(id),
            ]
        );
    }

    #[test]
    fn test_load_failure_is_sticky() {
        let loader = Arc::new(FakeLoader::new().missing("sound"));
        let mut info = info(&loader, "sound");
        let mut rx = info.subscribe();

        let err = info.activate().unwrap_err();
        assert!(matches!(err, ActivationError::Load { .. }));
        assert!(!info.is_available());
        assert_eq!(info.state(), PluginState::Unavailable);

        let err = info.activate().unwrap_err();
        assert!(matches!(err, ActivationError::Unavailable { .. }));

        assert_eq!(info.load_attempts(), 1);
        assert_eq!(loader.opens(), 1);
        assert!(!info.is_active());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_deactivate_unavailable_is_noop() {
        let loader = Arc::new(FakeLoader::new().missing("sound"));
        let mut info = info(&loader, "sound");
        let mut rx = info.subscribe();

        let _ = info.activate();
        info.deactivate();

        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_refusing_hook_fails_activation() {
        let loader = Arc::new(FakeLoader::new().refusing("sound"));
        let mut info = info(&loader, "sound");
        let mut rx = info.subscribe();

        let err = info.activate().unwrap_err();
        assert!(matches!(err, ActivationError::Hook { .. }));
        assert!(!info.is_active());
        // The module loaded fine, so the plugin stays available
        assert!(info.is_available());
        assert_eq!(info.state(), PluginState::Inactive);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        // A retry reuses the instance
        let _ = info.activate();
        assert_eq!(loader.opens(), 1);
    }

    #[test]
    fn test_panicking_hook_is_caught() {
        let loader = Arc::new(FakeLoader::new().panicking("sound"));
        let mut info = info(&loader, "sound");

        let err = info.activate().unwrap_err();
        assert!(matches!(err, ActivationError::Panicked { .. }));
        assert!(!info.is_active());
    }

    #[test]
    fn test_shared_event_channel() {
        let loader = Arc::new(FakeLoader::new());
        let (tx, mut rx) = broadcast::channel(8);
        let mut a = PluginInfo::with_events(descriptor("a", 1), loader.clone(), tx.clone());
        let mut b = PluginInfo::with_events(descriptor("b", 2), loader.clone(), tx);

        a.activate().unwrap();
        b.activate().unwrap();

        let ids: Vec<String> = drain(&mut rx)
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_drop_deactivates() {
        let loader = Arc::new(FakeLoader::new());
        let mut info = info(&loader, "sound");
        info.activate().unwrap();
        drop(info);

        assert_eq!(loader.log(), vec!["activate:sound", "deactivate:sound"]);
    }

    #[test]
    fn test_set_schema_seeds_enabled_and_priority() {
        let loader = Arc::new(FakeLoader::new());
        let settings = Arc::new(MemorySettings::new());
        settings.set_bool("s.sound", ENABLED_KEY, true);
        settings.set_int("s.sound", PRIORITY_KEY, 3);

        let mut info = info(&loader, "sound");
        let (tx, _rx) = change_channel();
        info.set_schema(settings, "s.sound", tx);

        assert!(info.is_enabled());
        assert_eq!(info.priority(), 3);
        assert_eq!(info.schema(), Some("s.sound"));
        // Binding alone does not start the plugin
        assert!(!info.is_active());
    }

    #[test]
    fn test_set_schema_ignores_non_positive_priority() {
        let loader = Arc::new(FakeLoader::new());
        let settings = Arc::new(MemorySettings::new());
        settings.set_int("s.sound", PRIORITY_KEY, 0);

        let mut info = info(&loader, "sound");
        let (tx, _rx) = change_channel();
        info.set_schema(settings.clone(), "s.sound", tx.clone());
        assert_eq!(info.priority(), 10);
        assert!(!info.is_enabled());

        settings.set_int("s.sound", PRIORITY_KEY, -4);
        info.set_schema(settings, "s.sound", tx);
        assert_eq!(info.priority(), 10);
    }

    #[test]
    fn test_priority_change_after_bind_is_not_observed() {
        let loader = Arc::new(FakeLoader::new());
        let settings = Arc::new(MemorySettings::new());
        let mut info = info(&loader, "sound");
        let (tx, mut rx) = change_channel();
        info.set_schema(settings.clone(), "s.sound", tx);

        settings.set_int("s.sound", PRIORITY_KEY, 2);
        assert!(rx.try_recv().is_err());
        info.on_settings_changed(PRIORITY_KEY);
        assert_eq!(info.priority(), 10);
    }

    #[test]
    fn test_toggle_false_true_false() {
        let loader = Arc::new(FakeLoader::new());
        let settings = Arc::new(MemorySettings::new());
        settings.set_bool("s.sound", ENABLED_KEY, false);

        let mut info = info(&loader, "sound");
        let mut events = info.subscribe();
        let (tx, mut changes) = change_channel();
        info.set_schema(settings.clone(), "s.sound", tx);
        assert!(!info.is_enabled());

        settings.set_bool("s.sound", ENABLED_KEY, true);
        let change = changes.try_recv().unwrap();
        info.on_settings_changed(&change.key);
        assert!(info.is_enabled());
        assert!(info.is_active());

        settings.set_bool("s.sound", ENABLED_KEY, false);
        let change = changes.try_recv().unwrap();
        info.on_settings_changed(&change.key);
        assert!(!info.is_enabled());
        assert!(!info.is_active());

        let id = PluginId::new("sound");
        assert_eq!(
            drain(&mut events),
            vec![PluginEvent::Activated(id.clone()), PluginEvent::Deactivated(id)]
        );
        assert_eq!(loader.log(), vec!["activate:sound", "deactivate:sound"]);
    }

    #[test]
    fn test_redundant_notifications_are_absorbed() {
        let loader = Arc::new(FakeLoader::new());
        let settings = Arc::new(MemorySettings::new());
        let mut info = info(&loader, "sound");
        let mut events = info.subscribe();
        let (tx, mut changes) = change_channel();
        info.set_schema(settings.clone(), "s.sound", tx);

        settings.set_bool("s.sound", ENABLED_KEY, true);
        settings.set_bool("s.sound", ENABLED_KEY, true);
        while let Ok(change) = changes.try_recv() {
            info.on_settings_changed(&change.key);
        }

        assert_eq!(drain(&mut events).len(), 1);
        assert_eq!(loader.opens(), 1);
    }

    #[test]
    fn test_enable_unavailable_plugin_has_no_effect() {
        let loader = Arc::new(FakeLoader::new().missing("sound"));
        let settings = Arc::new(MemorySettings::new());
        let mut info = info(&loader, "sound");
        let (tx, mut changes) = change_channel();
        info.set_schema(settings.clone(), "s.sound", tx);

        for enabled in [true, false, true] {
            settings.set_bool("s.sound", ENABLED_KEY, enabled);
            let change = changes.try_recv().unwrap();
            info.on_settings_changed(&change.key);
        }

        assert!(info.is_enabled());
        assert!(!info.is_active());
        assert_eq!(info.load_attempts(), 1);
    }

    #[test]
    fn test_unbound_change_is_ignored() {
        let loader = Arc::new(FakeLoader::new());
        let mut info = info(&loader, "sound");
        info.on_settings_changed(ENABLED_KEY);
        assert!(!info.is_active());
        assert_eq!(loader.opens(), 0);
    }

    #[test]
    fn test_set_schema_missing_enabled_key_disables() {
        let loader = Arc::new(FakeLoader::new());
        let settings = Arc::new(MemorySettings::new());
        settings.set_int("s.sound", PRIORITY_KEY, 2);

        let mut info = info(&loader, "sound");
        let (tx, _rx) = change_channel();
        info.set_schema(settings, "s.sound", tx);

        assert!(!info.is_enabled());
        assert_eq!(info.priority(), 2);
    }

    #[test]
    fn test_failure_reason_matches_error() {
        let path = std::path::PathBuf::from("/plugins/libsound.so");
        let mismatch = LoadError::ApiVersionMismatch {
            path: path.clone(),
            expected: 1,
            found: 0,
        };
        let missing = LoadError::MissingSymbol {
            path: path.clone(),
            symbol: "_settingsd_plugin_create".to_string(),
        };
        let null = LoadError::NullInstance { path };
        let unknown = LoadError::UnknownModule {
            location: "sound".to_string(),
        };

        assert_eq!(failure_reason(&mismatch), "was built for a different plugin API");
        assert_eq!(failure_reason(&missing), "does not export the plugin entry points");
        assert_eq!(failure_reason(&null), "failed to create the plugin instance");
        assert_eq!(failure_reason(&unknown), "is not a registered module");
        for e in [&mismatch, &missing, &null, &unknown] {
            assert_ne!(failure_reason(e), "cannot be read");
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PluginState::Unloaded.to_string(), "unloaded");
        assert_eq!(PluginState::Unavailable.to_string(), "unavailable");
    }
}
