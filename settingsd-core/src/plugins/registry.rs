//! Plugin registry - discovers plugins and drives their lifecycle

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::descriptor::{DESCRIPTOR_EXTENSION, PluginDescriptor, PluginId};
use super::error::RegistryError;
use super::info::{EVENT_CAPACITY, PluginEvent, PluginInfo};
use super::loader::ModuleLoader;
use crate::settings::{ChangeReceiver, ChangeSender, SettingChange, SettingsBackend, change_channel};

/// Default prefix of per-plugin settings schemas
pub const DEFAULT_SCHEMA_PREFIX: &str = "org.settingsd.plugins";

/// Configuration for [`PluginRegistry`]
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directories scanned for descriptors, highest precedence first
    pub plugin_dirs: Vec<PathBuf>,
    /// Schema prefix; a plugin's schema is `<prefix>.<id>`
    pub schema_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: settingsd_paths::plugin_dirs(),
            schema_prefix: DEFAULT_SCHEMA_PREFIX.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Settings schema for a plugin
    pub fn schema_for(&self, id: &PluginId) -> String {
        format!("{}.{}", self.schema_prefix, id)
    }
}

/// Outcome of [`PluginRegistry::start`]
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StartReport {
    /// Plugins that are now active
    pub activated: Vec<PluginId>,
    /// Enabled plugins that failed to activate
    pub failed: Vec<PluginId>,
}

/// Owns every discovered plugin.
///
/// Plugins are kept sorted by `(priority, id)`: [`start`](Self::start)
/// activates in that order and [`stop`](Self::stop) deactivates in reverse.
/// Settings changes reported by the backend are queued and applied by
/// [`dispatch_pending`](Self::dispatch_pending) or [`run`](Self::run), never
/// on the thread that noticed them.
pub struct PluginRegistry {
    config: RegistryConfig,
    loader: Arc<dyn ModuleLoader>,
    settings: Arc<dyn SettingsBackend>,
    plugins: Vec<PluginInfo>,
    events: broadcast::Sender<PluginEvent>,
    changes_tx: ChangeSender,
    changes_rx: ChangeReceiver,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new(
        config: RegistryConfig,
        loader: Arc<dyn ModuleLoader>,
        settings: Arc<dyn SettingsBackend>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (changes_tx, changes_rx) = change_channel();
        Self {
            config,
            loader,
            settings,
            plugins: Vec::new(),
            events,
            changes_tx,
            changes_rx,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Discover descriptors and bind each new plugin to its settings.
    ///
    /// Invalid descriptors are logged and skipped. When two directories hold
    /// the same plugin id, the one from the earlier directory wins. Returns
    /// the number of plugins added.
    pub fn load_all(&mut self) -> usize {
        let _span = tracing::debug_span!("load_all").entered();
        let mut added = 0;

        for dir in &self.config.plugin_dirs {
            let files = match descriptor_files(dir) {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping plugin directory");
                    continue;
                }
            };

            for file in files {
                // Errors are logged by the parser
                let Ok(descriptor) = PluginDescriptor::from_file(&file) else {
                    continue;
                };

                if self.plugins.iter().any(|p| p.id() == &descriptor.id) {
                    tracing::debug!(
                        plugin = %descriptor.id,
                        file = %file.display(),
                        "Plugin already discovered, ignoring"
                    );
                    continue;
                }

                let mut info = PluginInfo::with_events(
                    descriptor,
                    Arc::clone(&self.loader),
                    self.events.clone(),
                );
                let schema = self.config.schema_for(info.id());
                info.set_schema(Arc::clone(&self.settings), schema, self.changes_tx.clone());
                self.plugins.push(info);
                added += 1;
            }
        }

        self.plugins
            .sort_by(|a, b| (a.priority(), a.id()).cmp(&(b.priority(), b.id())));

        tracing::info!(count = self.plugins.len(), "Discovered plugins");
        added
    }

    /// Activate every enabled plugin in priority order
    pub fn start(&mut self) -> StartReport {
        let _span = tracing::info_span!("start").entered();
        let mut report = StartReport::default();

        for info in self.plugins.iter_mut().filter(|p| p.is_enabled()) {
            match info.activate() {
                Ok(()) => report.activated.push(info.id().clone()),
                Err(e) => {
                    tracing::debug!(plugin = %info.id(), error = %e, "Plugin not started");
                    report.failed.push(info.id().clone());
                }
            }
        }

        tracing::info!(
            activated = report.activated.len(),
            failed = report.failed.len(),
            "Plugins started"
        );
        report
    }

    /// Deactivate every active plugin in reverse priority order
    pub fn stop(&mut self) {
        let _span = tracing::info_span!("stop").entered();
        for info in self.plugins.iter_mut().rev() {
            info.deactivate();
        }
    }

    /// Route a settings change to the plugin bound to its schema.
    ///
    /// Returns false when no plugin owns the schema.
    pub fn handle_change(&mut self, change: &SettingChange) -> bool {
        match self
            .plugins
            .iter_mut()
            .find(|p| p.schema() == Some(change.schema.as_str()))
        {
            Some(info) => {
                tracing::debug!(plugin = %info.id(), key = %change.key, "Settings changed");
                info.on_settings_changed(&change.key);
                true
            }
            None => {
                tracing::debug!(schema = %change.schema, "Change for unknown schema");
                false
            }
        }
    }

    /// Apply every queued settings change. Returns how many were applied.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(change) = self.changes_rx.try_recv() {
            self.handle_change(&change);
            count += 1;
        }
        count
    }

    /// Start plugins, apply settings changes until `shutdown` is cancelled,
    /// then stop plugins.
    pub async fn run(&mut self, shutdown: CancellationToken) -> StartReport {
        let report = self.start();

        loop {
            let change = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                change = self.changes_rx.recv() => change,
            };
            match change {
                Some(change) => {
                    self.handle_change(&change);
                }
                None => break,
            }
        }

        tracing::info!("Shutting down plugins");
        self.stop();
        report
    }

    /// All plugins in start order
    pub fn plugins(&self) -> &[PluginInfo] {
        &self.plugins
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Look up a plugin by id
    pub fn get(&self, id: &str) -> Option<&PluginInfo> {
        self.plugins.iter().find(|p| p.id().as_str() == id)
    }

    /// Like [`get`](Self::get), but an unknown id is an error
    pub fn require(&self, id: &str) -> Result<&PluginInfo, RegistryError> {
        self.get(id).ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Subscribe to lifecycle events of all plugins
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("config", &self.config)
            .field("plugins", &self.plugins)
            .finish()
    }
}

/// Descriptor files in `dir`, sorted by file name.
///
/// A missing directory has no descriptors.
fn descriptor_files(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
        return Ok(Vec::new());
    }

    let read_err = |source| RegistryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == DESCRIPTOR_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
