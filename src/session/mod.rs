use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use crate::platform::{PlatformCallError, SharedStorageArea};

pub const AUTH_TOKEN_KEY: &str = "authToken";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session storage failed: {0}")]
    Storage(String),
}

impl From<PlatformCallError> for SessionError {
    fn from(value: PlatformCallError) -> Self {
        SessionError::Storage(value.to_string())
    }
}

// Auth token lives in memory for the life of the process and is mirrored
// into the local storage scope; the hosting process may be torn down
// between events, so `load` restores it at startup.
pub struct Session {
    area: SharedStorageArea,
    token: Mutex<Option<String>>,
    backend_available: AtomicBool,
}

impl Session {
    pub fn new(area: SharedStorageArea) -> Self {
        Self {
            area,
            token: Mutex::new(None),
            backend_available: AtomicBool::new(false),
        }
    }

    pub fn load(&self) -> Result<(), SessionError> {
        let mirrored = match self.area.get(AUTH_TOKEN_KEY)? {
            Some(Value::String(token)) if !token.trim().is_empty() => Some(token),
            _ => None,
        };
        if let Ok(mut guard) = self.token.lock() {
            *guard = mirrored;
        }
        Ok(())
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn store_token(&self, token: &str) -> Result<(), SessionError> {
        self.area
            .set(AUTH_TOKEN_KEY, Value::String(String::from(token)))?;
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(String::from(token));
        }
        Ok(())
    }

    pub fn clear_token(&self) -> Result<(), SessionError> {
        self.area.remove(AUTH_TOKEN_KEY)?;
        self.forget_token();
        Ok(())
    }

    // Drops only the in-memory copy; used when the local scope has already
    // been wiped wholesale.
    pub fn forget_token(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }

    pub fn backend_available(&self) -> bool {
        self.backend_available.load(Ordering::Relaxed)
    }

    pub fn set_backend_available(&self, available: bool) {
        self.backend_available.store(available, Ordering::Relaxed);
    }
}
