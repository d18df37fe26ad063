use std::sync::Arc;
use std::time::Duration;

use kvs_crypto::{derive, namespace, HashAlgorithm};
use kvs_dao::KeyValueDao;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::backend::{self, Backend};
use crate::error::{LockError, LockResult};
use crate::fast::FastStore;

/// Default lock lifetime.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);
/// Longest lifetime a caller may request.
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(3600);
const MIN_LOCK_TTL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockSettings {
    /// Algorithm that turns a lock namespace string into a namespace UUID.
    pub hash_algo: HashAlgorithm,
    /// TTL used when a caller does not pass one.
    pub default_ttl: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            hash_algo: HashAlgorithm::default(),
            default_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

/// TTL-bounded mutual exclusion shared by every worker.
///
/// A lock is named by a namespace string plus a parameter mapping; the two
/// are hashed into one key, so parameter order does not matter. At most one
/// `acquire` per key succeeds until the holder releases or the TTL elapses.
/// Locks are not re-entrant, and there is no renewal.
///
/// Each call picks its backend afresh: the fast store when it is configured
/// and reachable, the key-value store otherwise. Both report the same
/// errors.
#[derive(Clone)]
pub struct DistributedLock {
    dao: KeyValueDao,
    fast: Option<Arc<dyn FastStore>>,
    settings: LockSettings,
}

impl DistributedLock {
    pub fn new(dao: KeyValueDao, fast: Option<Arc<dyn FastStore>>, settings: LockSettings) -> Self {
        Self {
            dao,
            fast,
            settings,
        }
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// The key a `(namespace, params)` pair locks.
    pub fn key<P: Serialize + ?Sized>(&self, namespace_name: &str, params: &P) -> LockResult<Uuid> {
        Ok(derive(namespace(namespace_name, self.settings.hash_algo), params)?)
    }

    /// Take the lock, or fail with [`LockError::AlreadyHeld`].
    ///
    /// `ttl` defaults to the configured TTL and is clamped to
    /// `1s..=1h`. The returned guard releases on drop.
    pub fn acquire<P: Serialize + ?Sized>(
        &self,
        namespace_name: &str,
        params: &P,
        ttl: Option<Duration>,
    ) -> LockResult<LockGuard<'_>> {
        let key = self.key(namespace_name, params)?;
        let ttl = self.clamp(ttl);
        let via = self.acquire_key(key, ttl)?;
        debug!(namespace = namespace_name, %key, ?via, ttl_ms = ttl.as_millis() as u64, "acquired lock");
        Ok(LockGuard {
            lock: self,
            key,
            via,
            released: false,
        })
    }

    /// Free the lock if it is held. Releasing a lock that is not held, has
    /// expired, or was already released succeeds.
    ///
    /// The holder may have acquired through either backend, so this clears
    /// both. Fast store failures are logged; key-value store failures are
    /// returned.
    pub fn release<P: Serialize + ?Sized>(&self, namespace_name: &str, params: &P) -> LockResult<()> {
        let key = self.key(namespace_name, params)?;
        if let Some(fast) = &self.fast {
            if fast.is_available() {
                backend::fast_release(fast.as_ref(), key);
            }
        }
        backend::kvs_release(&self.dao, key)
    }

    /// Run `f` while holding the lock.
    ///
    /// `f` receives the lock key, usable as a correlation id. If the lock
    /// cannot be taken, `f` does not run. The lock is released on every exit
    /// path, including a panic in `f`; a release failure after `f` returned
    /// is reported instead of `f`'s result.
    pub fn with_lock<P, R>(
        &self,
        namespace_name: &str,
        params: &P,
        ttl: Option<Duration>,
        f: impl FnOnce(Uuid) -> R,
    ) -> LockResult<R>
    where
        P: Serialize + ?Sized,
    {
        let guard = self.acquire(namespace_name, params, ttl)?;
        let out = f(guard.key());
        guard.release()?;
        Ok(out)
    }

    fn clamp(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.settings.default_ttl)
            .clamp(MIN_LOCK_TTL, MAX_LOCK_TTL)
    }

    fn acquire_key(&self, key: Uuid, ttl: Duration) -> LockResult<Backend> {
        let Some(store) = backend::select(self.fast.as_ref()) else {
            return backend::kvs_acquire(&self.dao, key, ttl).map(|()| Backend::Kvs);
        };
        match backend::fast_acquire(store, key, ttl) {
            Ok(()) => Ok(Backend::Fast),
            Err(LockError::Backend(err)) => {
                error!(%key, error = %err, "fast store acquire failed, reporting lock as held");
                Err(LockError::AlreadyHeld { key })
            }
            Err(err) => Err(err),
        }
    }

    fn release_key(&self, key: Uuid, via: Backend) -> LockResult<()> {
        match via {
            Backend::Fast => {
                if let Some(store) = self.fast.as_deref() {
                    backend::fast_release(store, key);
                }
                Ok(())
            }
            Backend::Kvs => backend::kvs_release(&self.dao, key),
        }
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("fast", &self.fast.as_ref().map(|s| s.name()))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// A held lock. Dropping the guard releases it on the backend that granted
/// it; call [`LockGuard::release`] to observe release errors.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a DistributedLock,
    key: Uuid,
    via: Backend,
    released: bool,
}

impl LockGuard<'_> {
    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn release(mut self) -> LockResult<()> {
        self.released = true;
        self.lock.release_key(self.key, self.via)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.lock.release_key(self.key, self.via) {
            error!(key = %self.key, error = %err, "lock release on drop failed, lock will expire by ttl");
        }
    }
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("via", &self.via)
            .finish()
    }
}
