use chrono::{DateTime, Utc};
use kvs_types::{Key, KeyValueEntry, Resource, UserId};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// A row to insert. `id` is assigned by the backend unless supplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEntry {
    pub resource: Resource,
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub value: Vec<u8>,
    pub actor: Option<UserId>,
    pub at: DateTime<Utc>,
    pub expires_on: Option<DateTime<Utc>>,
}

impl NewEntry {
    /// Materialize the row once the backend has settled on an id.
    pub fn into_entry(self, id: i64) -> KeyValueEntry {
        KeyValueEntry {
            id,
            uuid: self.uuid,
            resource: self.resource,
            value: self.value,
            created_on: self.at,
            created_by: self.actor,
            changed_on: self.at,
            changed_by: self.actor,
            expires_on: self.expires_on,
        }
    }

    /// The key reported when this row collides with an existing one.
    pub fn conflict_key(&self) -> Key {
        match self.id {
            Some(id) => Key::Id(id),
            None => Key::Uuid(self.uuid),
        }
    }
}

/// One open unit of work against a [`KvBackend`].
///
/// Implementations must satisfy these invariants:
/// - Reads observe writes made earlier in the same transaction.
/// - Nothing is visible to other transactions until [`commit`](Self::commit).
/// - Dropping a transaction without committing rolls every write back.
pub trait KvTransaction {
    /// Fetch the row addressed by `key`, expired or not.
    fn get(&mut self, resource: Resource, key: &Key) -> StoreResult<Option<KeyValueEntry>>;

    /// Insert a row.
    ///
    /// Returns [`StoreError::Duplicate`] if the id or the uuid is already
    /// taken within `resource`.
    fn insert(&mut self, entry: NewEntry) -> StoreResult<KeyValueEntry>;

    /// Overwrite the mutable fields (`value`, `changed_on`, `changed_by`,
    /// `expires_on`) of the row with `entry.id`. Returns `false` if there is
    /// no such row.
    fn update(&mut self, entry: &KeyValueEntry) -> StoreResult<bool>;

    /// Overwrite only `expires_on` of the row with `id`, leaving the audit
    /// fields alone. Returns `false` if there is no such row.
    fn set_expiry(
        &mut self,
        resource: Resource,
        id: i64,
        expires_on: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    /// Delete the row addressed by `key`. Returns `true` if a row was removed.
    fn delete(&mut self, resource: Resource, key: &Key) -> StoreResult<bool>;

    /// Delete every row in `resource` whose `expires_on <= now`.
    fn delete_expired(&mut self, resource: Resource, now: DateTime<Utc>) -> StoreResult<usize>;

    /// Make every write in this transaction durable and visible.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// A transactional store of [`KeyValueEntry`] rows.
pub trait KvBackend: Send + Sync {
    /// Open a transaction. Blocks while another writer holds the store.
    fn begin(&self) -> StoreResult<Box<dyn KvTransaction + '_>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Run `f` inside a transaction on `backend`.
///
/// Commits when `f` returns `Ok`. On `Err` the transaction is dropped and
/// every write made by `f` is rolled back.
pub fn transaction<'s, R, E, F>(backend: &'s dyn KvBackend, f: F) -> Result<R, E>
where
    E: From<StoreError>,
    F: FnOnce(&mut (dyn KvTransaction + 's)) -> Result<R, E>,
{
    let mut tx = backend.begin()?;
    let out = f(tx.as_mut())?;
    tx.commit()?;
    Ok(out)
}
