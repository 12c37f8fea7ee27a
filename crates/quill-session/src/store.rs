//! Durable store adapter.
//!
//! The session persists one entry per canonical field name, enabling
//! partial reads and writes. The concrete backing store (on-disk
//! key/value database, browser storage, ...) lives behind
//! [`KeyValueStore`]; this crate only ships the in-memory implementation
//! used by tests and demos.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

/// Asynchronous key/value storage for session state.
///
/// `get` must distinguish absence (`None`) from any stored value,
/// including falsy ones. `set` applies all entries atomically enough that
/// a later batch for the same key wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn set(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()>;
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value synchronously, for test setup.
    pub fn seed(&self, key: impl Into<String>, value: serde_json::Value) {
        self.lock().insert(key.into(), value);
    }

    /// Read a value synchronously, for test assertions.
    pub fn peek(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, serde_json::Value>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()> {
        let mut guard = self.lock();
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }
}
