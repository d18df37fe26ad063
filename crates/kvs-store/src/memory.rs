use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use kvs_types::{Key, KeyValueEntry, Resource};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{KvBackend, KvTransaction, NewEntry};

#[derive(Default)]
struct MemoryState {
    rows: BTreeMap<(Resource, i64), KeyValueEntry>,
    uuids: HashMap<(Resource, Uuid), i64>,
    next_id: i64,
}

impl MemoryState {
    fn resolve(&self, resource: Resource, key: &Key) -> Option<i64> {
        match key {
            Key::Id(id) => self.rows.contains_key(&(resource, *id)).then_some(*id),
            Key::Uuid(uuid) => self.uuids.get(&(resource, *uuid)).copied(),
        }
    }

    fn put(&mut self, entry: KeyValueEntry) {
        self.uuids.insert((entry.resource, entry.uuid), entry.id);
        self.rows.insert((entry.resource, entry.id), entry);
    }

    fn remove(&mut self, resource: Resource, id: i64) -> Option<KeyValueEntry> {
        let entry = self.rows.remove(&(resource, id))?;
        self.uuids.remove(&(resource, entry.uuid));
        Some(entry)
    }
}

/// In-memory, `BTreeMap`-based entry store.
///
/// Intended for tests and embedding. A single mutex serializes
/// transactions, so every transaction sees a consistent snapshot.
pub struct InMemoryKvStore {
    state: Mutex<MemoryState>,
}

impl InMemoryKvStore {
    /// Create a new empty store. Ids start at 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..MemoryState::default()
            }),
        }
    }

    /// Number of rows across all resources, expired rows included.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    /// Returns `true` if the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Number of rows in `resource`, expired rows included.
    pub fn count(&self, resource: Resource) -> usize {
        self.lock()
            .rows
            .range((resource, i64::MIN)..=(resource, i64::MAX))
            .count()
    }

    // A panic inside a transaction rolls back before the guard is released,
    // so the state behind a poisoned mutex is still consistent.
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for InMemoryKvStore {
    fn begin(&self) -> StoreResult<Box<dyn KvTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            state: self.lock(),
            undo: Vec::new(),
            committed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

enum Undo {
    Inserted { resource: Resource, id: i64 },
    Replaced(KeyValueEntry),
    Removed(KeyValueEntry),
    NextId(i64),
}

struct MemoryTransaction<'a> {
    state: MutexGuard<'a, MemoryState>,
    undo: Vec<Undo>,
    committed: bool,
}

impl KvTransaction for MemoryTransaction<'_> {
    fn get(&mut self, resource: Resource, key: &Key) -> StoreResult<Option<KeyValueEntry>> {
        Ok(self
            .state
            .resolve(resource, key)
            .and_then(|id| self.state.rows.get(&(resource, id)))
            .filter(|row| row.matches(key))
            .cloned())
    }

    fn insert(&mut self, entry: NewEntry) -> StoreResult<KeyValueEntry> {
        let resource = entry.resource;
        let id = entry.id.unwrap_or(self.state.next_id);
        if self.state.rows.contains_key(&(resource, id))
            || self.state.uuids.contains_key(&(resource, entry.uuid))
        {
            return Err(StoreError::Duplicate {
                resource,
                key: entry.conflict_key(),
            });
        }

        if id >= self.state.next_id {
            self.undo.push(Undo::NextId(self.state.next_id));
            self.state.next_id = id + 1;
        }
        let row = entry.into_entry(id);
        self.state.put(row.clone());
        self.undo.push(Undo::Inserted { resource, id });
        Ok(row)
    }

    fn update(&mut self, entry: &KeyValueEntry) -> StoreResult<bool> {
        let Some(row) = self.state.rows.get_mut(&(entry.resource, entry.id)) else {
            return Ok(false);
        };
        let before = row.clone();
        row.value = entry.value.clone();
        row.changed_on = entry.changed_on;
        row.changed_by = entry.changed_by;
        row.expires_on = entry.expires_on;
        self.undo.push(Undo::Replaced(before));
        Ok(true)
    }

    fn set_expiry(
        &mut self,
        resource: Resource,
        id: i64,
        expires_on: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let Some(row) = self.state.rows.get_mut(&(resource, id)) else {
            return Ok(false);
        };
        self.undo.push(Undo::Replaced(row.clone()));
        row.expires_on = expires_on;
        Ok(true)
    }

    fn delete(&mut self, resource: Resource, key: &Key) -> StoreResult<bool> {
        let Some(id) = self.state.resolve(resource, key) else {
            return Ok(false);
        };
        match self.state.remove(resource, id) {
            Some(removed) => {
                self.undo.push(Undo::Removed(removed));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_expired(&mut self, resource: Resource, now: DateTime<Utc>) -> StoreResult<usize> {
        let expired: Vec<i64> = self
            .state
            .rows
            .range((resource, i64::MIN)..=(resource, i64::MAX))
            .filter(|(_, row)| row.is_expired(now))
            .map(|((_, id), _)| *id)
            .collect();
        for id in &expired {
            if let Some(removed) = self.state.remove(resource, *id) {
                self.undo.push(Undo::Removed(removed));
            }
        }
        Ok(expired.len())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Inserted { resource, id } => {
                    self.state.remove(resource, id);
                }
                Undo::Replaced(before) => {
                    self.state.rows.insert((before.resource, before.id), before);
                }
                Undo::Removed(row) => self.state.put(row),
                Undo::NextId(next) => self.state.next_id = next,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::transaction;
    use chrono::Duration;

    fn new_entry(resource: Resource, value: &[u8]) -> NewEntry {
        NewEntry {
            resource,
            id: None,
            uuid: Uuid::new_v4(),
            value: value.to_vec(),
            actor: None,
            at: Utc::now(),
            expires_on: None,
        }
    }

    // ----------------------------------------------------------------
    // Basic operations
    // ----------------------------------------------------------------

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = InMemoryKvStore::new();
        let (a, b) = transaction(&store, |tx| -> StoreResult<_> {
            let a = tx.insert(new_entry(Resource::App, b"a"))?;
            let b = tx.insert(new_entry(Resource::App, b"b"))?;
            Ok((a, b))
        })
        .unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_by_id_and_uuid() {
        let store = InMemoryKvStore::new();
        let row = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"x"))).unwrap();

        let mut tx = store.begin().unwrap();
        let by_id = tx.get(Resource::Kv, &Key::Id(row.id)).unwrap().unwrap();
        let by_uuid = tx.get(Resource::Kv, &Key::Uuid(row.uuid)).unwrap().unwrap();
        assert_eq!(by_id, by_uuid);
        assert!(tx.get(Resource::App, &Key::Id(row.id)).unwrap().is_none());
    }

    #[test]
    fn duplicate_uuid_is_rejected_per_resource() {
        let store = InMemoryKvStore::new();
        let first = new_entry(Resource::Lock, b"1");
        let mut second = new_entry(Resource::Lock, b"2");
        second.uuid = first.uuid;
        let mut other = new_entry(Resource::App, b"3");
        other.uuid = first.uuid;

        transaction(&store, |tx| tx.insert(first)).unwrap();
        let err = transaction(&store, |tx| tx.insert(second)).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { resource: Resource::Lock, .. }));
        transaction(&store, |tx| tx.insert(other)).unwrap();
    }

    #[test]
    fn caller_supplied_id_advances_sequence() {
        let store = InMemoryKvStore::new();
        let mut fixed = new_entry(Resource::Kv, b"f");
        fixed.id = Some(10);
        transaction(&store, |tx| tx.insert(fixed)).unwrap();
        let next = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"n"))).unwrap();
        assert_eq!(next.id, 11);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = InMemoryKvStore::new();
        let row = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"a"))).unwrap();
        transaction(&store, |tx| tx.delete(Resource::Kv, &Key::Id(row.id))).unwrap();
        let next = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"b"))).unwrap();
        assert!(next.id > row.id);
    }

    #[test]
    fn update_overwrites_mutable_fields() {
        let store = InMemoryKvStore::new();
        let mut row = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"a"))).unwrap();
        row.value = b"b".to_vec();
        row.expires_on = Some(row.created_on + Duration::seconds(5));
        assert!(transaction(&store, |tx| tx.update(&row)).unwrap());

        let mut tx = store.begin().unwrap();
        let stored = tx.get(Resource::Kv, &Key::Id(row.id)).unwrap().unwrap();
        assert_eq!(stored.value, b"b");
        assert_eq!(stored.expires_on, row.expires_on);
    }

    #[test]
    fn update_missing_row_returns_false() {
        let store = InMemoryKvStore::new();
        let row = new_entry(Resource::Kv, b"a").into_entry(42);
        assert!(!transaction(&store, |tx| tx.update(&row)).unwrap());
    }

    #[test]
    fn delete_expired_only_touches_expired_rows_in_resource() {
        let store = InMemoryKvStore::new();
        let now = Utc::now();
        let mut stale = new_entry(Resource::MetastoreCache, b"old");
        stale.expires_on = Some(now - Duration::seconds(1));
        let mut fresh = new_entry(Resource::MetastoreCache, b"new");
        fresh.expires_on = Some(now + Duration::seconds(60));
        let mut other = new_entry(Resource::Lock, b"lock");
        other.expires_on = Some(now - Duration::seconds(1));

        transaction(&store, |tx| -> StoreResult<()> {
            tx.insert(stale)?;
            tx.insert(fresh)?;
            tx.insert(other)?;
            Ok(())
        })
        .unwrap();

        let swept =
            transaction(&store, |tx| tx.delete_expired(Resource::MetastoreCache, now)).unwrap();
        assert_eq!(swept, 1);
        assert_eq!(store.count(Resource::MetastoreCache), 1);
        assert_eq!(store.count(Resource::Lock), 1);
    }

    // ----------------------------------------------------------------
    // Rollback
    // ----------------------------------------------------------------

    #[test]
    fn error_rolls_back_every_write() {
        let store = InMemoryKvStore::new();
        let kept = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"keep"))).unwrap();

        let result: StoreResult<()> = transaction(&store, |tx| {
            tx.insert(new_entry(Resource::Kv, b"gone"))?;
            tx.delete(Resource::Kv, &Key::Id(kept.id))?;
            Err(StoreError::Database("boom".into()))
        });
        assert!(result.is_err());

        assert_eq!(store.len(), 1);
        let mut tx = store.begin().unwrap();
        assert!(tx.get(Resource::Kv, &Key::Uuid(kept.uuid)).unwrap().is_some());
        drop(tx);
        let next = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"n"))).unwrap();
        assert_eq!(next.id, kept.id + 1);
    }

    #[test]
    fn dropped_transaction_restores_updated_row() {
        let store = InMemoryKvStore::new();
        let mut row = transaction(&store, |tx| tx.insert(new_entry(Resource::Kv, b"a"))).unwrap();
        {
            let mut tx = store.begin().unwrap();
            row.value = b"changed".to_vec();
            tx.update(&row).unwrap();
        }
        let mut tx = store.begin().unwrap();
        let stored = tx.get(Resource::Kv, &Key::Id(row.id)).unwrap().unwrap();
        assert_eq!(stored.value, b"a");
    }
}
