use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kvs_types::{Clock, SystemClock};

use crate::error::FastStoreError;

/// A shared in-memory store with an atomic set-if-absent-with-expiry.
///
/// Implementations must satisfy these invariants:
/// - `set_if_absent` is atomic across every client of the store.
/// - A key set with a TTL disappears by itself once the TTL elapses.
/// - `delete` of a missing key succeeds.
pub trait FastStore: Send + Sync {
    /// Short store name for logs.
    fn name(&self) -> &'static str;

    /// Whether the store can serve a request right now. Cheap enough to
    /// call before every operation.
    fn is_available(&self) -> bool;

    /// Set `key` with expiry `ttl` unless it already exists. Returns `true`
    /// if this call set it.
    fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, FastStoreError>;

    fn delete(&self, key: &str) -> Result<(), FastStoreError>;

    /// Drop any pooled connections. Later calls reconnect lazily.
    fn shutdown(&self) {}
}

/// Process-local [`FastStore`] for tests and single-process deployments.
///
/// Availability can be toggled to simulate an outage; while unavailable,
/// every command fails with [`FastStoreError::Unavailable`].
pub struct InMemoryFastStore {
    clock: Arc<dyn Clock>,
    keys: Mutex<HashMap<String, DateTime<Utc>>>,
    available: AtomicBool,
}

impl InMemoryFastStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            keys: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether `key` is set and unexpired.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .is_some_and(|expires| *expires > now)
    }

    fn check(&self) -> Result<(), FastStoreError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(FastStoreError::Unavailable("in-memory store offline".into()))
        }
    }
}

impl Default for InMemoryFastStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FastStore for InMemoryFastStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, FastStoreError> {
        self.check()?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| FastStoreError::Command(format!("ttl out of range: {e}")))?;
        let now = self.clock.now();
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if keys.get(key).is_some_and(|expires| *expires > now) {
            return Ok(false);
        }
        keys.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<(), FastStoreError> {
        self.check()?;
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvs_types::ManualClock;

    #[test]
    fn set_if_absent_is_exclusive_until_expiry() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryFastStore::with_clock(clock.clone());
        assert!(store.set_if_absent("k", Duration::from_secs(30)).unwrap());
        assert!(!store.set_if_absent("k", Duration::from_secs(30)).unwrap());
        clock.advance(chrono::Duration::seconds(30));
        assert!(store.set_if_absent("k", Duration::from_secs(30)).unwrap());
    }

    #[test]
    fn delete_frees_the_key() {
        let store = InMemoryFastStore::new();
        store.set_if_absent("k", Duration::from_secs(30)).unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(!store.contains("k"));
    }

    #[test]
    fn offline_store_refuses_commands() {
        let store = InMemoryFastStore::new();
        store.set_available(false);
        assert!(!store.is_available());
        assert!(matches!(
            store.set_if_absent("k", Duration::from_secs(1)),
            Err(FastStoreError::Unavailable(_))
        ));
    }
}
