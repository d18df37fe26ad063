//! Cache entries follow the injected clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as Elapsed;
use kvs_cache::{MetastoreCache, Ttl};
use kvs_crypto::HashAlgorithm;
use kvs_dao::KeyValueDao;
use kvs_store::InMemoryKvStore;
use kvs_types::{Clock, ManualClock};

#[test]
fn ttl_of_ten_seconds_is_visible_at_nine_and_gone_at_eleven() {
    let clock = Arc::new(ManualClock::starting_now());
    let t0 = clock.now();
    let dao = KeyValueDao::with_clock(Arc::new(InMemoryKvStore::new()), clock.clone());
    let cache = MetastoreCache::new(dao, "kvs_metastore_cache", HashAlgorithm::Sha256, None);

    cache
        .set("k", "v", Ttl::After(Duration::from_secs(10)))
        .unwrap();

    clock.set(t0 + Elapsed::seconds(9));
    assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v"));

    clock.set(t0 + Elapsed::seconds(11));
    assert_eq!(cache.get::<String>("k").unwrap(), None);
    assert!(!cache.has("k").unwrap());
}

#[test]
fn add_sweeps_expired_neighbours() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemoryKvStore::new());
    let dao = KeyValueDao::with_clock(store.clone(), clock.clone());
    let cache = MetastoreCache::new(dao, "sweep", HashAlgorithm::Sha256, None);

    for key in ["a", "b", "c"] {
        cache.set(key, "x", Duration::from_secs(1).into()).unwrap();
    }
    clock.advance(Elapsed::seconds(2));
    assert!(cache.add("d", "y", Ttl::Never).unwrap());
    assert_eq!(store.count(kvs_types::Resource::MetastoreCache), 1);
}
