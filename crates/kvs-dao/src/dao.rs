use std::sync::Arc;

use chrono::{DateTime, Utc};
use kvs_codec::Codec;
use kvs_store::{transaction, KvBackend, KvTransaction, NewEntry, StoreError};
use kvs_types::{Clock, Key, KeyValueEntry, Resource, SystemClock, UserId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{KvError, KvResult};

/// Which single-operation call a begin/commit failure belongs to.
#[derive(Clone, Copy)]
enum Op {
    Read,
    Create,
    Update,
    Delete,
}

impl Op {
    fn fail(self, err: StoreError) -> KvError {
        match self {
            Self::Read => KvError::ReadFailed(err),
            Self::Create => KvError::from_insert(err),
            Self::Update => KvError::UpdateFailed(err),
            Self::Delete => KvError::DeleteFailed(err),
        }
    }
}

enum Failure {
    Kv(KvError),
    Store(StoreError),
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Data access object over a [`KvBackend`].
///
/// Every method runs in its own transaction. Use [`KeyValueDao::transaction`]
/// to compose several operations atomically. Expired entries are logically
/// absent to every read.
#[derive(Clone)]
pub struct KeyValueDao {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    actor: Option<UserId>,
}

impl KeyValueDao {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            actor: None,
        }
    }

    /// A DAO that records `actor` in the audit fields of every write.
    /// `None` is the anonymous user.
    pub fn as_user(&self, actor: Option<UserId>) -> Self {
        Self {
            actor,
            ..self.clone()
        }
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Run `f` in one transaction: all of its writes commit together or
    /// not at all. Begin/commit failures surface as
    /// [`KvError::UpdateFailed`].
    ///
    /// `f` must go through the [`Scope`] it is handed; calling back into the
    /// DAO from inside `f` blocks on the open transaction.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut Scope<'_>) -> KvResult<R>) -> KvResult<R> {
        self.run(Op::Update, f)
    }

    pub fn get_entry(&self, resource: Resource, key: &Key) -> KvResult<Option<KeyValueEntry>> {
        self.run(Op::Read, |s| s.get_entry(resource, key))
    }

    pub fn get_value<T: DeserializeOwned>(
        &self,
        resource: Resource,
        key: &Key,
        codec: &Codec,
    ) -> KvResult<Option<T>> {
        self.run(Op::Read, |s| s.get_value(resource, key, codec))
    }

    pub fn create_entry<T: Serialize + ?Sized>(
        &self,
        resource: Resource,
        value: &T,
        codec: &Codec,
        key: Option<Key>,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<KeyValueEntry> {
        self.run(Op::Create, |s| s.create_entry(resource, value, codec, key, expires_on))
    }

    pub fn update_entry<T: Serialize + ?Sized>(
        &self,
        resource: Resource,
        value: &T,
        codec: &Codec,
        key: &Key,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<KeyValueEntry> {
        self.run(Op::Update, |s| s.update_entry(resource, value, codec, key, expires_on))
    }

    pub fn upsert_entry<T: Serialize + ?Sized>(
        &self,
        resource: Resource,
        value: &T,
        codec: &Codec,
        key: &Key,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<KeyValueEntry> {
        self.run(Op::Update, |s| s.upsert_entry(resource, value, codec, key, expires_on))
    }

    pub fn touch_entry(
        &self,
        resource: Resource,
        key: &Key,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<bool> {
        self.run(Op::Update, |s| s.touch_entry(resource, key, expires_on))
    }

    pub fn delete_entry(&self, resource: Resource, key: &Key) -> KvResult<bool> {
        self.run(Op::Delete, |s| s.delete_entry(resource, key))
    }

    pub fn delete_expired_entries(&self, resource: Resource) -> KvResult<usize> {
        self.run(Op::Delete, |s| s.delete_expired_entries(resource))
    }

    fn run<R>(&self, op: Op, f: impl FnOnce(&mut Scope<'_>) -> KvResult<R>) -> KvResult<R> {
        let now = self.clock.now();
        let actor = self.actor;
        transaction(self.backend.as_ref(), |tx| {
            let mut scope = Scope { tx, now, actor };
            f(&mut scope).map_err(Failure::Kv)
        })
        .map_err(|failure| match failure {
            Failure::Kv(err) => err,
            Failure::Store(err) => op.fail(err),
        })
    }
}

impl std::fmt::Debug for KeyValueDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueDao")
            .field("backend", &self.backend.name())
            .field("actor", &self.actor)
            .finish()
    }
}

/// The DAO operations bound to one open transaction.
///
/// All operations in a scope share one timestamp, taken when the
/// transaction began.
pub struct Scope<'t> {
    tx: &'t mut (dyn KvTransaction + 't),
    now: DateTime<Utc>,
    actor: Option<UserId>,
}

impl Scope<'_> {
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The live entry addressed by `key`, or `None` if it is absent or expired.
    pub fn get_entry(&mut self, resource: Resource, key: &Key) -> KvResult<Option<KeyValueEntry>> {
        let row = self.tx.get(resource, key).map_err(KvError::ReadFailed)?;
        Ok(row.filter(|entry| !entry.is_expired(self.now)))
    }

    pub fn get_value<T: DeserializeOwned>(
        &mut self,
        resource: Resource,
        key: &Key,
        codec: &Codec,
    ) -> KvResult<Option<T>> {
        match self.get_entry(resource, key)? {
            Some(entry) => codec
                .decode(&entry.value)
                .map(Some)
                .map_err(KvError::CodecDecode),
            None => Ok(None),
        }
    }

    /// Insert a new entry.
    ///
    /// Without a supplied `key` the backend assigns the id and a random
    /// uuid is drawn. A supplied key that collides with a live entry is
    /// [`KvError::DuplicateKey`]; an expired entry in the way is removed
    /// first.
    pub fn create_entry<T: Serialize + ?Sized>(
        &mut self,
        resource: Resource,
        value: &T,
        codec: &Codec,
        key: Option<Key>,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<KeyValueEntry> {
        let bytes = codec.encode(value).map_err(KvError::CodecEncode)?;
        if let Some(key) = &key {
            self.reclaim_expired(resource, key)?;
        }
        let (id, uuid) = match key {
            Some(Key::Id(id)) => (Some(id), Uuid::new_v4()),
            Some(Key::Uuid(uuid)) => (None, uuid),
            None => (None, Uuid::new_v4()),
        };
        let entry = self
            .tx
            .insert(NewEntry {
                resource,
                id,
                uuid,
                value: bytes,
                actor: self.actor,
                at: self.now,
                expires_on,
            })
            .map_err(KvError::from_insert)?;
        debug!(%resource, id = entry.id, "created entry");
        Ok(entry)
    }

    /// Replace the value and expiry of a live entry.
    pub fn update_entry<T: Serialize + ?Sized>(
        &mut self,
        resource: Resource,
        value: &T,
        codec: &Codec,
        key: &Key,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<KeyValueEntry> {
        let bytes = codec.encode(value).map_err(KvError::CodecEncode)?;
        let Some(mut entry) = self.get_entry(resource, key)? else {
            return Err(KvError::NotFound {
                resource,
                key: *key,
            });
        };
        entry.value = bytes;
        entry.changed_on = self.now;
        entry.changed_by = self.actor;
        entry.expires_on = expires_on;
        if !self.tx.update(&entry).map_err(KvError::UpdateFailed)? {
            return Err(KvError::NotFound {
                resource,
                key: *key,
            });
        }
        Ok(entry)
    }

    /// Update the entry at `key` if it is live, otherwise create it there.
    pub fn upsert_entry<T: Serialize + ?Sized>(
        &mut self,
        resource: Resource,
        value: &T,
        codec: &Codec,
        key: &Key,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<KeyValueEntry> {
        if self.get_entry(resource, key)?.is_some() {
            self.update_entry(resource, value, codec, key, expires_on)
        } else {
            self.create_entry(resource, value, codec, Some(*key), expires_on)
        }
    }

    /// Move the expiry of a live entry without touching its value or its
    /// audit fields. Returns `false` if no live entry is at `key`.
    pub fn touch_entry(
        &mut self,
        resource: Resource,
        key: &Key,
        expires_on: Option<DateTime<Utc>>,
    ) -> KvResult<bool> {
        let Some(entry) = self.get_entry(resource, key)? else {
            return Ok(false);
        };
        self.tx
            .set_expiry(resource, entry.id, expires_on)
            .map_err(KvError::UpdateFailed)
    }

    /// Remove the entry at `key`. Returns `true` only if a live entry was
    /// removed; an expired row is cleaned up but reported as absent.
    pub fn delete_entry(&mut self, resource: Resource, key: &Key) -> KvResult<bool> {
        let live = self.get_entry(resource, key)?.is_some();
        let removed = self.tx.delete(resource, key).map_err(KvError::DeleteFailed)?;
        Ok(live && removed)
    }

    /// Sweep every expired entry in `resource`. Returns how many were removed.
    pub fn delete_expired_entries(&mut self, resource: Resource) -> KvResult<usize> {
        let swept = self
            .tx
            .delete_expired(resource, self.now)
            .map_err(KvError::DeleteFailed)?;
        if swept > 0 {
            debug!(%resource, swept, "swept expired entries");
        }
        Ok(swept)
    }

    fn reclaim_expired(&mut self, resource: Resource, key: &Key) -> KvResult<()> {
        let row = self.tx.get(resource, key).map_err(KvError::ReadFailed)?;
        if row.is_some_and(|entry| entry.is_expired(self.now)) {
            self.tx.delete(resource, key).map_err(KvError::DeleteFailed)?;
        }
        Ok(())
    }
}
