//! Key/value cache used by the SDK for session state
//!
//! The [`CacheStore`] trait lets callers inject their own backend. The
//! default [`MemoryCache`] keeps values in process and scopes every key under
//! a prefix so several SDK instances can share one backing map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::CacheError;

/// Async cache abstraction
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Read a value, `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

    /// Remove a value; removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every value owned by this store
    async fn clean(&self) -> Result<(), CacheError>;
}

type SharedMap = Arc<RwLock<HashMap<String, Value>>>;

/// In-memory cache with prefixed keys
#[derive(Debug, Clone)]
pub struct MemoryCache {
    prefix: String,
    entries: SharedMap,
}

impl MemoryCache {
    /// Create a cache with its own backing map
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_backing(prefix, Arc::default())
    }

    /// Create a cache over an existing backing map
    ///
    /// Useful when several instances must observe the same storage, the way
    /// browser storage outlives a single SDK object.
    #[must_use]
    pub fn with_backing(prefix: impl Into<String>, entries: SharedMap) -> Self {
        Self { prefix: prefix.into(), entries }
    }

    /// Handle to the backing map
    #[must_use]
    pub fn backing(&self) -> SharedMap {
        Arc::clone(&self.entries)
    }

    /// Number of keys stored under this cache's prefix
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().keys().filter(|k| k.starts_with(&self.prefix)).count()
    }

    /// Whether no key is stored under this cache's prefix
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.read().get(&self.full_key(key)).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.entries.write().insert(self.full_key(key), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(&self.full_key(key));
        Ok(())
    }

    async fn clean(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&self.prefix));
        tracing::debug!(prefix = %self.prefix, removed = before - entries.len(), "cache cleaned");
        Ok(())
    }
}
