use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::key::Key;
use crate::resource::Resource;
use crate::user::UserId;

/// One stored value.
///
/// `value` is the exact output of the codec that encoded it; the store never
/// looks inside. `id` and `uuid` are immutable once assigned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueEntry {
    pub id: i64,
    pub uuid: Uuid,
    pub resource: Resource,
    pub value: Vec<u8>,
    pub created_on: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub changed_on: DateTime<Utc>,
    pub changed_by: Option<UserId>,
    pub expires_on: Option<DateTime<Utc>>,
}

impl KeyValueEntry {
    /// An entry whose `expires_on` is at or before `now` is logically absent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|at| at <= now)
    }

    /// Returns `true` if `key` addresses this entry.
    pub fn matches(&self, key: &Key) -> bool {
        match key {
            Key::Id(id) => self.id == *id,
            Key::Uuid(uuid) => self.uuid == *uuid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(expires_on: Option<DateTime<Utc>>) -> KeyValueEntry {
        let now = Utc::now();
        KeyValueEntry {
            id: 1,
            uuid: Uuid::new_v4(),
            resource: Resource::App,
            value: b"v".to_vec(),
            created_on: now,
            created_by: None,
            changed_on: now,
            changed_by: Some(UserId(3)),
            expires_on,
        }
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let t0 = Utc::now();
        let e = entry(Some(t0 + Duration::seconds(10)));
        assert!(!e.is_expired(t0 + Duration::seconds(9)));
        assert!(e.is_expired(t0 + Duration::seconds(10)));
        assert!(e.is_expired(t0 + Duration::seconds(11)));
    }

    #[test]
    fn no_expiry_never_expires() {
        let e = entry(None);
        assert!(!e.is_expired(Utc::now() + Duration::days(365 * 100)));
    }

    #[test]
    fn matches_both_identities() {
        let e = entry(None);
        assert!(e.matches(&Key::Id(1)));
        assert!(e.matches(&Key::Uuid(e.uuid)));
        assert!(!e.matches(&Key::Id(2)));
        assert!(!e.matches(&Key::Uuid(Uuid::new_v4())));
    }
}
