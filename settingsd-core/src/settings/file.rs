//! File-backed settings store
//!
//! Stored as TOML, one table per schema:
//!
//! ```toml
//! ["org.settingsd.plugins.sound"]
//! active = true
//! priority = 5
//! ```

use notify::{RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tempfile::NamedTempFile;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ChangeSender, SettingsBackend, SettingsError, Watch, notify_watches};

type Schemas = BTreeMap<String, toml::Table>;

#[derive(Debug, Default)]
struct State {
    values: Schemas,
    watches: Vec<Watch>,
}

/// Settings persisted in a TOML file.
///
/// Watchers are notified when a reload finds a watched value different from
/// before, whether the reload was triggered by [`reload`](Self::reload), by a
/// write through this store, or by the file watcher started with
/// [`watch_file`](Self::watch_file).
pub struct TomlSettings {
    path: PathBuf,
    state: Arc<Mutex<State>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl TomlSettings {
    /// Open a settings file
    ///
    /// A missing file reads as empty settings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = read_schemas(&path)?;
        Ok(Self {
            path,
            state: Arc::new(Mutex::new(State {
                values,
                watches: Vec::new(),
            })),
            watcher: Mutex::new(None),
        })
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and notify watchers of changed values
    pub fn reload(&self) -> Result<(), SettingsError> {
        reload_state(&self.path, &self.state)
    }

    /// Watch the settings file and reload whenever it changes.
    ///
    /// The parent directory is watched rather than the file itself, so
    /// editors that replace the file on save are picked up too.
    pub fn watch_file(&self) -> Result<(), SettingsError> {
        let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| SettingsError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let state = Arc::clone(&self.state);

        let mut watcher = recommended_watcher(move |event: notify::Result<notify::Event>| {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "Settings watcher error");
                    return;
                }
            };

            let touches_file = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_file || event.kind.is_access() {
                return;
            }

            tracing::debug!(path = %path.display(), "Settings file changed");
            if let Err(e) = reload_state(&path, &state) {
                tracing::warn!(error = %e, "Keeping previous settings");
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %dir.display(), "Watching settings directory");
        *slot = Some(watcher);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn get(&self, schema: &str, key: &str) -> Option<toml::Value> {
        self.lock()
            .values
            .get(schema)
            .and_then(|table| table.get(key))
            .cloned()
    }

    fn set(&self, schema: &str, key: &str, value: toml::Value) -> Result<(), SettingsError> {
        let mut values = read_schemas(&self.path)?;
        values
            .entry(schema.to_string())
            .or_default()
            .insert(key.to_string(), value);
        write_schemas(&self.path, &values)?;
        self.reload()
    }

    /// Write a boolean to the file
    pub fn set_bool(&self, schema: &str, key: &str, value: bool) -> Result<(), SettingsError> {
        self.set(schema, key, toml::Value::Boolean(value))
    }

    /// Write an integer to the file
    pub fn set_int(&self, schema: &str, key: &str, value: i64) -> Result<(), SettingsError> {
        self.set(schema, key, toml::Value::Integer(value))
    }
}

impl std::fmt::Debug for TomlSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TomlSettings")
            .field("path", &self.path)
            .field(
                "watching",
                &self
                    .watcher
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some(),
            )
            .finish()
    }
}

impl SettingsBackend for TomlSettings {
    fn get_bool(&self, schema: &str, key: &str) -> Option<bool> {
        self.get(schema, key).and_then(|v| v.as_bool())
    }

    fn get_int(&self, schema: &str, key: &str) -> Option<i64> {
        self.get(schema, key).and_then(|v| v.as_integer())
    }

    fn watch(&self, schema: &str, key: &str, changes: ChangeSender) {
        self.lock().watches.push(Watch {
            schema: schema.to_string(),
            key: key.to_string(),
            changes,
        });
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_schemas(path: &Path) -> Result<Schemas, SettingsError> {
    if !path.exists() {
        return Ok(Schemas::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_schemas(path: &Path, values: &Schemas) -> Result<(), SettingsError> {
    let content = toml::to_string_pretty(values)?;
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| SettingsError::Io { path, source }
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_err(dir))?;

    // Replace the file in one rename so a watcher never reads a partial write
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    tmp.write_all(content.as_bytes()).map_err(io_err(tmp.path()))?;
    tmp.persist(path).map_err(|e| SettingsError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn reload_state(path: &Path, state: &Mutex<State>) -> Result<(), SettingsError> {
    let values = read_schemas(path)?;
    let mut state = lock(state);
    let old = std::mem::replace(&mut state.values, values);

    let mut changed: Vec<(String, String)> = state
        .watches
        .iter()
        .filter(|w| lookup(&old, &w.schema, &w.key) != lookup(&state.values, &w.schema, &w.key))
        .map(|w| (w.schema.clone(), w.key.clone()))
        .collect();
    changed.sort();
    changed.dedup();

    for (schema, key) in changed {
        notify_watches(&mut state.watches, &schema, &key);
    }
    Ok(())
}

fn lookup<'a>(values: &'a Schemas, schema: &str, key: &str) -> Option<&'a toml::Value> {
    values.get(schema).and_then(|table| table.get(key))
}
