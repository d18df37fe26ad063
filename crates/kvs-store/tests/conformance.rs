//! Behaviour every `KvBackend` must share.

use chrono::{DateTime, Duration, Utc};
use kvs_store::{
    transaction, InMemoryKvStore, KvBackend, NewEntry, SqliteConfig, SqliteKvStore, StoreError,
    StoreResult,
};
use kvs_types::{Key, Resource, UserId};
use uuid::Uuid;

fn draft(resource: Resource, value: &[u8]) -> NewEntry {
    NewEntry {
        resource,
        id: None,
        uuid: Uuid::new_v4(),
        value: value.to_vec(),
        actor: Some(UserId(1)),
        at: Utc::now(),
        expires_on: None,
    }
}

fn backends(dir: &tempfile::TempDir) -> Vec<Box<dyn KvBackend>> {
    let sqlite = SqliteKvStore::open(&SqliteConfig::new(dir.path().join("kv.db"))).unwrap();
    vec![Box::new(InMemoryKvStore::new()), Box::new(sqlite)]
}

#[test]
fn id_and_uuid_address_the_same_row() {
    let dir = tempfile::tempdir().unwrap();
    for backend in backends(&dir) {
        let row = transaction(backend.as_ref(), |tx| tx.insert(draft(Resource::Kv, b"v"))).unwrap();
        let mut tx = backend.begin().unwrap();
        let a = tx.get(Resource::Kv, &Key::Id(row.id)).unwrap();
        let b = tx.get(Resource::Kv, &Key::Uuid(row.uuid)).unwrap();
        assert_eq!(a, b, "backend {}", backend.name());
        assert!(a.is_some());
    }
}

#[test]
fn resources_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    for backend in backends(&dir) {
        let mut first = draft(Resource::DashboardPermalink, b"d");
        first.id = Some(5);
        let mut second = draft(Resource::ExplorePermalink, b"e");
        second.id = Some(5);
        second.uuid = first.uuid;
        transaction(backend.as_ref(), |tx| -> StoreResult<()> {
            tx.insert(first)?;
            tx.insert(second)?;
            Ok(())
        })
        .unwrap();

        let mut tx = backend.begin().unwrap();
        let d = tx.get(Resource::DashboardPermalink, &Key::Id(5)).unwrap().unwrap();
        let e = tx.get(Resource::ExplorePermalink, &Key::Id(5)).unwrap().unwrap();
        assert_eq!(d.value, b"d");
        assert_eq!(e.value, b"e");
    }
}

#[test]
fn duplicate_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    for backend in backends(&dir) {
        let mut a = draft(Resource::Kv, b"a");
        a.id = Some(3);
        let mut b = draft(Resource::Kv, b"b");
        b.id = Some(3);
        transaction(backend.as_ref(), |tx| tx.insert(a)).unwrap();
        let err = transaction(backend.as_ref(), |tx| tx.insert(b)).unwrap_err();
        assert!(
            matches!(err, StoreError::Duplicate { key: Key::Id(3), .. }),
            "backend {}: {err}",
            backend.name()
        );
    }
}

#[test]
fn reads_see_own_writes_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    for backend in backends(&dir) {
        let mut tx = backend.begin().unwrap();
        let row = tx.insert(draft(Resource::Kv, b"pending")).unwrap();
        assert!(tx.get(Resource::Kv, &Key::Uuid(row.uuid)).unwrap().is_some());
        drop(tx);

        let mut tx = backend.begin().unwrap();
        assert!(tx.get(Resource::Kv, &Key::Uuid(row.uuid)).unwrap().is_none());
    }
}

#[test]
fn expired_rows_are_still_returned_raw() {
    let dir = tempfile::tempdir().unwrap();
    for backend in backends(&dir) {
        let mut stale = draft(Resource::Lock, b"l");
        stale.expires_on = Some(Utc::now() - Duration::seconds(5));
        let row = transaction(backend.as_ref(), |tx| tx.insert(stale)).unwrap();
        let mut tx = backend.begin().unwrap();
        let found = tx.get(Resource::Lock, &Key::Uuid(row.uuid)).unwrap().unwrap();
        assert!(found.is_expired(Utc::now()));
    }
}

#[test]
fn expiry_keeps_sub_millisecond_precision() {
    let dir = tempfile::tempdir().unwrap();
    let t0 = DateTime::from_timestamp(1_700_000_000, 999_999).unwrap();
    let expires = t0 + Duration::seconds(10);
    for backend in backends(&dir) {
        let mut entry = draft(Resource::MetastoreCache, b"c");
        entry.at = t0;
        entry.expires_on = Some(expires);
        let row = transaction(backend.as_ref(), |tx| tx.insert(entry)).unwrap();

        let mut tx = backend.begin().unwrap();
        let found = tx
            .get(Resource::MetastoreCache, &Key::Id(row.id))
            .unwrap()
            .unwrap();
        drop(tx);
        assert_eq!(found.expires_on, Some(expires), "backend {}", backend.name());
        assert!(!found.is_expired(expires - Duration::nanoseconds(1)));
        assert!(found.is_expired(expires));

        let early = expires - Duration::nanoseconds(1);
        let swept = transaction(backend.as_ref(), |tx| {
            tx.delete_expired(Resource::MetastoreCache, early)
        })
        .unwrap();
        assert_eq!(swept, 0, "backend {}", backend.name());
        let swept = transaction(backend.as_ref(), |tx| {
            tx.delete_expired(Resource::MetastoreCache, expires)
        })
        .unwrap();
        assert_eq!(swept, 1, "backend {}", backend.name());
    }
}

#[test]
fn set_expiry_leaves_audit_fields_alone() {
    let dir = tempfile::tempdir().unwrap();
    for backend in backends(&dir) {
        let row = transaction(backend.as_ref(), |tx| tx.insert(draft(Resource::Kv, b"v"))).unwrap();
        let later = row.created_on + Duration::minutes(5);
        let changed = transaction(backend.as_ref(), |tx| {
            tx.set_expiry(Resource::Kv, row.id, Some(later))
        })
        .unwrap();
        assert!(changed, "backend {}", backend.name());

        let mut tx = backend.begin().unwrap();
        let found = tx.get(Resource::Kv, &Key::Id(row.id)).unwrap().unwrap();
        assert!(!tx.set_expiry(Resource::Kv, row.id + 100, None).unwrap());
        drop(tx);
        assert_eq!(found.expires_on, Some(later));
        assert_eq!(found.changed_on, row.changed_on);
        assert_eq!(found.changed_by, row.changed_by);
        assert_eq!(found.value, row.value);
    }
}

#[test]
fn sqlite_file_is_shared_between_handles() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteConfig::new(dir.path().join("nested/shared.db"));
    let writer = SqliteKvStore::open(&config).unwrap();
    let reader = SqliteKvStore::open(&config).unwrap();

    let row = transaction(&writer, |tx| tx.insert(draft(Resource::App, b"salt"))).unwrap();
    let mut tx = reader.begin().unwrap();
    let seen = tx.get(Resource::App, &Key::Uuid(row.uuid)).unwrap().unwrap();
    assert_eq!(seen.value, b"salt");
    assert_eq!(reader.path(), Some(config.path.as_path()));
}

#[test]
fn sqlite_rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteConfig::new(dir.path().join("kv.db"));
    let uuid = {
        let store = SqliteKvStore::open(&config).unwrap();
        transaction(&store, |tx| tx.insert(draft(Resource::Kv, b"durable")))
            .unwrap()
            .uuid
    };
    let store = SqliteKvStore::open(&config).unwrap();
    let mut tx = store.begin().unwrap();
    assert!(tx.get(Resource::Kv, &Key::Uuid(uuid)).unwrap().is_some());
}
