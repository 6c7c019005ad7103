//! In-process settings store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ChangeSender, SettingsBackend, Watch, notify_watches};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Bool(bool),
    Int(i64),
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<(String, String), Value>,
    watches: Vec<Watch>,
}

/// Settings kept in memory.
///
/// Every `set_*` call notifies watchers, even when the value is unchanged,
/// the same way a write to a real settings database would.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<Inner>,
}

impl MemorySettings {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, schema: &str, key: &str, value: Value) {
        let mut inner = self.lock();
        inner
            .values
            .insert((schema.to_string(), key.to_string()), value);
        notify_watches(&mut inner.watches, schema, key);
    }

    fn get(&self, schema: &str, key: &str) -> Option<Value> {
        self.lock()
            .values
            .get(&(schema.to_string(), key.to_string()))
            .copied()
    }

    /// Write a boolean
    pub fn set_bool(&self, schema: &str, key: &str, value: bool) {
        self.set(schema, key, Value::Bool(value));
    }

    /// Write an integer
    pub fn set_int(&self, schema: &str, key: &str, value: i64) {
        self.set(schema, key, Value::Int(value));
    }
}

impl SettingsBackend for MemorySettings {
    fn get_bool(&self, schema: &str, key: &str) -> Option<bool> {
        match self.get(schema, key)? {
            Value::Bool(v) => Some(v),
            Value::Int(_) => None,
        }
    }

    fn get_int(&self, schema: &str, key: &str) -> Option<i64> {
        match self.get(schema, key)? {
            Value::Int(v) => Some(v),
            Value::Bool(_) => None,
        }
    }

    fn watch(&self, schema: &str, key: &str, changes: ChangeSender) {
        self.lock().watches.push(Watch {
            schema: schema.to_string(),
            key: key.to_string(),
            changes,
        });
    }
}
