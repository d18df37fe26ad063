//! Generic string values behind the KV REST surface.
//!
//! Each value is stored as a JSON envelope that remembers its TTL, so a
//! read can push the expiry forward again (sliding expiration).

use chrono::{DateTime, Utc};
use kvs_codec::Codec;
use kvs_dao::{KeyValueDao, KvResult};
use kvs_types::{Key, KeyValueEntry, Resource};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Longest TTL a caller may ask for (about 100 years).
pub const MAX_DURATION_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Request body of `POST` and `PUT`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvRequest {
    pub value: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default = "default_reset")]
    pub reset_duration_on_retrieval: bool,
}

fn default_reset() -> bool {
    true
}

impl KvRequest {
    pub fn validate(&self) -> ServerResult<()> {
        match self.duration_ms {
            Some(0) => Err(ServerError::BadRequest("duration_ms must be positive".into())),
            Some(ms) if ms > MAX_DURATION_MS => Err(ServerError::BadRequest(format!(
                "duration_ms must not exceed {MAX_DURATION_MS}"
            ))),
            _ => Ok(()),
        }
    }

    fn into_stored(self) -> StoredValue {
        StoredValue {
            value: self.value,
            duration_ms: self.duration_ms,
            reset_duration_on_retrieval: self.reset_duration_on_retrieval,
        }
    }
}

/// What is persisted for each value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: String,
    pub duration_ms: Option<u64>,
    pub reset_duration_on_retrieval: bool,
}

impl StoredValue {
    fn expires_on(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ms = i64::try_from(self.duration_ms?.min(MAX_DURATION_MS)).ok()?;
        now.checked_add_signed(chrono::Duration::milliseconds(ms))
    }
}

const CODEC: Codec = Codec::JsonLiteral;

pub fn create(dao: &KeyValueDao, resource: Resource, request: KvRequest) -> ServerResult<KeyValueEntry> {
    request.validate()?;
    let stored = request.into_stored();
    Ok(dao.transaction(|s| {
        let expires_on = stored.expires_on(s.now());
        s.create_entry(resource, &stored, &CODEC, None, expires_on)
    })?)
}

/// Read a live value. A value stored with a TTL and
/// `reset_duration_on_retrieval` gets `expires_on = now + ttl` in the same
/// transaction.
pub fn read(dao: &KeyValueDao, resource: Resource, key: &Key) -> KvResult<Option<String>> {
    dao.transaction(|s| {
        let Some(stored) = s.get_value::<StoredValue>(resource, key, &CODEC)? else {
            return Ok(None);
        };
        if stored.reset_duration_on_retrieval && stored.duration_ms.is_some() {
            let expires_on = stored.expires_on(s.now());
            s.touch_entry(resource, key, expires_on)?;
        }
        Ok(Some(stored.value))
    })
}

pub fn update(
    dao: &KeyValueDao,
    resource: Resource,
    key: &Key,
    request: KvRequest,
) -> ServerResult<KeyValueEntry> {
    request.validate()?;
    let stored = request.into_stored();
    Ok(dao.transaction(|s| {
        let expires_on = stored.expires_on(s.now());
        s.update_entry(resource, &stored, &CODEC, key, expires_on)
    })?)
}

pub fn delete(dao: &KeyValueDao, resource: Resource, key: &Key) -> KvResult<bool> {
    dao.delete_entry(resource, key)
}
