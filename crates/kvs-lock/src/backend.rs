use std::sync::Arc;
use std::time::Duration;

use kvs_codec::Codec;
use kvs_dao::{KeyValueDao, KvError};
use kvs_types::{Key, Resource};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{LockError, LockResult};
use crate::fast::FastStore;

/// Which substrate served an acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Backend {
    Fast,
    Kvs,
}

pub(crate) fn fast_key(key: Uuid) -> String {
    format!("kvs:lock:{key}")
}

/// Backend A: one atomic set-if-absent with expiry.
pub(crate) fn fast_acquire(store: &dyn FastStore, key: Uuid, ttl: Duration) -> LockResult<()> {
    if store.set_if_absent(&fast_key(key), ttl)? {
        Ok(())
    } else {
        Err(LockError::AlreadyHeld { key })
    }
}

/// Release on backend A never fails; the key's TTL is the safety net.
pub(crate) fn fast_release(store: &dyn FastStore, key: Uuid) {
    if let Err(err) = store.delete(&fast_key(key)) {
        warn!(%key, store = store.name(), error = %err, "fast store release failed, leaving it to ttl");
    }
}

/// Backend B: sweep stale locks, then insert a row keyed by the lock key.
/// The `(resource, uuid)` unique constraint provides the exclusion.
pub(crate) fn kvs_acquire(dao: &KeyValueDao, key: Uuid, ttl: Duration) -> LockResult<()> {
    let ttl = chrono::Duration::from_std(ttl).ok();
    let result = dao.transaction(|s| {
        let expires_on = ttl.and_then(|ttl| s.now().checked_add_signed(ttl));
        s.delete_expired_entries(Resource::Lock)?;
        s.create_entry(
            Resource::Lock,
            &true,
            &Codec::JsonLiteral,
            Some(Key::Uuid(key)),
            expires_on,
        )
    });
    match result {
        Ok(_) => Ok(()),
        Err(KvError::DuplicateKey { .. }) => Err(LockError::AlreadyHeld { key }),
        Err(source) => Err(LockError::AcquireFailed { key, source }),
    }
}

pub(crate) fn kvs_release(dao: &KeyValueDao, key: Uuid) -> LockResult<()> {
    let removed = dao
        .delete_entry(Resource::Lock, &Key::Uuid(key))
        .map_err(|source| LockError::ReleaseFailed { key, source })?;
    debug!(%key, removed, "released kvs lock");
    Ok(())
}

/// Per-call backend choice: the fast store when it is configured and
/// reachable, `None` (use the key-value store) otherwise.
pub(crate) fn select(fast: Option<&Arc<dyn FastStore>>) -> Option<&dyn FastStore> {
    let store = fast?;
    if store.is_available() {
        Some(store.as_ref())
    } else {
        debug!(store = store.name(), "fast store unavailable, using kvs lock backend");
        None
    }
}
