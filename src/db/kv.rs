use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;

use crate::platform::{PlatformCallError, StorageArea, StorageListener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    Sync,
    Local,
}

impl StorageScope {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageScope::Sync => "sync",
            StorageScope::Local => "local",
        }
    }
}

#[derive(Debug, Error)]
pub enum KvStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("value encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct SqliteStorageArea {
    db_path: PathBuf,
    scope: StorageScope,
    listeners: Mutex<Vec<StorageListener>>,
}

impl SqliteStorageArea {
    pub fn new(db_path: impl Into<PathBuf>, scope: StorageScope) -> Self {
        Self {
            db_path: db_path.into(),
            scope,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn initialize(&self) -> Result<(), KvStoreError> {
        self.with_connection(|_| Ok(()))
    }

    fn with_connection<T, F>(&self, func: F) -> Result<T, KvStoreError>
    where
        F: FnOnce(&Connection) -> Result<T, KvStoreError>,
    {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(self.db_path.as_path())?;
        ensure_schema(&conn)?;
        func(&conn)
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

    pub fn read(&self, key: &str) -> Result<Option<Value>, KvStoreError> {
        let scope = self.scope.as_str();
        self.with_connection(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE scope = ?1 AND key = ?2",
                    params![scope, key],
                    |row| row.get(0),
                )
                .optional()?;
            match raw {
                Some(text) => Ok(Some(serde_json::from_str(text.as_str())?)),
                None => Ok(None),
            }
        })
    }

    pub fn write(&self, key: &str, value: &Value) -> Result<(), KvStoreError> {
        let scope = self.scope.as_str();
        let encoded = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "
                INSERT INTO kv_entries (scope, key, value, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (scope, key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![scope, key, encoded, now],
            )?;
            Ok(())
        })?;
        self.notify(key);
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), KvStoreError> {
        let scope = self.scope.as_str();
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM kv_entries WHERE scope = ?1 AND key = ?2",
                params![scope, key],
            )?;
            Ok(())
        })?;
        self.notify(key);
        Ok(())
    }

    pub fn delete_all(&self) -> Result<Vec<String>, KvStoreError> {
        let scope = self.scope.as_str();
        let keys = self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv_entries WHERE scope = ?1")?;
            let mut rows = stmt.query(params![scope])?;
            let mut keys = Vec::new();
            while let Some(row) = rows.next()? {
                keys.push(row.get::<_, String>(0)?);
            }
            conn.execute("DELETE FROM kv_entries WHERE scope = ?1", params![scope])?;
            Ok(keys)
        })?;
        for key in &keys {
            self.notify(key.as_str());
        }
        Ok(keys)
    }
}

impl StorageArea for SqliteStorageArea {
    fn get(&self, key: &str) -> Result<Option<Value>, PlatformCallError> {
        self.read(key)
            .map_err(|e| PlatformCallError::Storage(e.to_string()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), PlatformCallError> {
        self.write(key, &value)
            .map_err(|e| PlatformCallError::Storage(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), PlatformCallError> {
        self.delete(key)
            .map_err(|e| PlatformCallError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<(), PlatformCallError> {
        self.delete_all()
            .map(|_| ())
            .map_err(|e| PlatformCallError::Storage(e.to_string()))
    }

    fn subscribe(&self, listener: StorageListener) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), KvStoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv_entries (
          scope TEXT NOT NULL,
          key TEXT NOT NULL,
          value TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          PRIMARY KEY (scope, key)
        );
        ",
    )?;
    Ok(())
}
