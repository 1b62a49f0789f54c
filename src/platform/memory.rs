use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::platform::{PlatformCallError, StorageArea, StorageListener};

#[derive(Default)]
pub struct MemoryStorageArea {
    entries: Mutex<BTreeMap<String, Value>>,
    listeners: Mutex<Vec<StorageListener>>,
}

impl MemoryStorageArea {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, key: &str) {
        let listeners = self
            .listeners
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        for listener in listeners {
            listener(key);
        }
    }

    fn lock_entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>, PlatformCallError> {
        self.entries
            .lock()
            .map_err(|_| PlatformCallError::Storage(String::from("storage mutex poisoned")))
    }
}

impl StorageArea for MemoryStorageArea {
    fn get(&self, key: &str) -> Result<Option<Value>, PlatformCallError> {
        Ok(self.lock_entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), PlatformCallError> {
        self.lock_entries()?.insert(String::from(key), value);
        self.notify(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PlatformCallError> {
        self.lock_entries()?.remove(key);
        self.notify(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), PlatformCallError> {
        let keys: Vec<String> = {
            let mut entries = self.lock_entries()?;
            let keys = entries.keys().cloned().collect();
            entries.clear();
            keys
        };
        for key in keys {
            self.notify(key.as_str());
        }
        Ok(())
    }

    fn subscribe(&self, listener: StorageListener) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }
}
