//! Persisted plugin settings
//!
//! Each plugin is addressed by a schema (`org.settingsd.plugins.<id>`) holding
//! a boolean [`ENABLED_KEY`] and an integer [`PRIORITY_KEY`]. The daemon only
//! reads these values; they are written by whatever front end the user
//! toggles plugins from.
//!
//! Change notifications are not delivered by calling back into plugin code.
//! A backend pushes a [`SettingChange`] onto the channel given to
//! [`SettingsBackend::watch`], and the registry applies it on its own
//! dispatch task. This keeps watcher threads from ever running plugin
//! hooks.

mod file;
mod memory;

pub use file::TomlSettings;
pub use memory::MemorySettings;

use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Boolean key that enables a plugin
pub const ENABLED_KEY: &str = "active";

/// Integer key that overrides a plugin's descriptor priority
pub const PRIORITY_KEY: &str = "priority";

/// Notification that a watched key was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    /// Schema the key belongs to
    pub schema: String,
    /// Key that changed
    pub key: String,
}

impl SettingChange {
    /// Create a change notification
    pub fn new(schema: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            key: key.into(),
        }
    }
}

/// Sending half of the change channel
pub type ChangeSender = mpsc::UnboundedSender<SettingChange>;

/// Receiving half of the change channel
pub type ChangeReceiver = mpsc::UnboundedReceiver<SettingChange>;

/// Create a change channel
pub fn change_channel() -> (ChangeSender, ChangeReceiver) {
    mpsc::unbounded_channel()
}

/// A persisted configuration endpoint
pub trait SettingsBackend: Send + Sync {
    /// Read a boolean; `None` if unset or not a boolean
    fn get_bool(&self, schema: &str, key: &str) -> Option<bool>;

    /// Read an integer; `None` if unset or not an integer
    fn get_int(&self, schema: &str, key: &str) -> Option<i64>;

    /// Send a [`SettingChange`] on `changes` whenever `schema`/`key` changes
    fn watch(&self, schema: &str, key: &str, changes: ChangeSender);
}

/// Errors from the file-backed settings store
#[derive(Error, Debug)]
pub enum SettingsError {
    /// IO error
    #[error("Settings IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML
    #[error("Cannot parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Settings could not be serialized
    #[error("Cannot serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// File watcher could not be set up
    #[error("Cannot watch settings file: {0}")]
    Watch(#[from] notify::Error),
}

/// A registered watch
#[derive(Debug)]
struct Watch {
    schema: String,
    key: String,
    changes: ChangeSender,
}

impl Watch {
    fn matches(&self, schema: &str, key: &str) -> bool {
        self.schema == schema && self.key == key
    }
}

/// Notify every watch matching `schema`/`key`, dropping watches whose
/// receiver has gone away
fn notify_watches(watches: &mut Vec<Watch>, schema: &str, key: &str) {
    watches.retain(|w| {
        if !w.matches(schema, key) {
            return true;
        }
        w.changes.send(SettingChange::new(schema, key)).is_ok()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_watches_filters_and_prunes() {
        let (tx, mut rx) = change_channel();
        let (closed_tx, closed_rx) = change_channel();
        drop(closed_rx);

        let mut watches = vec![
            Watch {
                schema: "a".into(),
                key: ENABLED_KEY.into(),
                changes: tx.clone(),
            },
            Watch {
                schema: "b".into(),
                key: ENABLED_KEY.into(),
                changes: tx,
            },
            Watch {
                schema: "a".into(),
                key: ENABLED_KEY.into(),
                changes: closed_tx,
            },
        ];

        notify_watches(&mut watches, "a", ENABLED_KEY);

        assert_eq!(rx.try_recv().unwrap(), SettingChange::new("a", ENABLED_KEY));
        assert!(rx.try_recv().is_err());
        assert_eq!(watches.len(), 2);
    }
}
