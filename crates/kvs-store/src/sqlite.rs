use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kvs_types::{Key, KeyValueEntry, Resource, UserId};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{KvBackend, KvTransaction, NewEntry};

const SCHEMA_VERSION: i64 = 2;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const SELECT_COLUMNS: &str = "resource, id, uuid, value, created_on, created_by, \
                              changed_on, changed_by, expires_on";

/// Configuration for [`SqliteKvStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the database file. Parent directories are created on open.
    pub path: PathBuf,
    /// How long a writer waits for another process's lock, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Durable entry store backed by a single SQLite connection.
///
/// Writers take the database lock up front (`BEGIN IMMEDIATE`), so several
/// processes may share one file. Timestamps are persisted as Unix
/// nanoseconds, so expiry compares exactly as it does in memory. Expiries
/// beyond the year 2262 saturate to the largest storable instant.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteKvStore {
    /// Open (or create) the database described by `config`.
    pub fn open(config: &SqliteConfig) -> StoreResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(&config.path, flags)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        initialize_schema(&conn)?;
        debug!(path = %config.path.display(), "opened sqlite key-value store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(config.path.clone()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the backing file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // A panicking transaction rolls back in `Drop` before the guard is
    // released, so a poisoned connection is still usable.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KvBackend for SqliteKvStore {
    fn begin(&self) -> StoreResult<Box<dyn KvTransaction + '_>> {
        let conn = self.lock();
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(Box::new(SqliteTransaction { conn, done: false }))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn initialize_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "BEGIN IMMEDIATE;
         CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);
         CREATE TABLE IF NOT EXISTS key_value (
             resource   TEXT    NOT NULL,
             id         INTEGER NOT NULL,
             uuid       TEXT    NOT NULL,
             value      BLOB    NOT NULL,
             created_on INTEGER NOT NULL,
             created_by INTEGER,
             changed_on INTEGER NOT NULL,
             changed_by INTEGER,
             expires_on INTEGER,
             PRIMARY KEY (resource, id),
             UNIQUE (resource, uuid)
         );
         CREATE INDEX IF NOT EXISTS ix_key_value_expires_on
             ON key_value (resource, expires_on);
         CREATE TABLE IF NOT EXISTS key_value_seq (
             singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
             next_id   INTEGER NOT NULL
         );
         INSERT OR IGNORE INTO key_value_seq (singleton, next_id) VALUES (0, 1);
         COMMIT;",
    )?;
    let version: Option<i64> = conn
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            conn.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            Ok(())
        }
        Some(SCHEMA_VERSION) => Ok(()),
        Some(other) => Err(StoreError::Database(format!(
            "unsupported schema version {other} (expected {SCHEMA_VERSION})"
        ))),
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    done: bool,
}

impl SqliteTransaction<'_> {
    fn next_id(&self) -> StoreResult<i64> {
        Ok(self.conn.query_row(
            "SELECT next_id FROM key_value_seq WHERE singleton = 0",
            params![],
            |row| row.get(0),
        )?)
    }
}

impl KvTransaction for SqliteTransaction<'_> {
    fn get(&mut self, resource: Resource, key: &Key) -> StoreResult<Option<KeyValueEntry>> {
        let raw = match key {
            Key::Id(id) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM key_value WHERE resource = ?1 AND id = ?2"
                    ),
                    params![resource.tag(), id],
                    RawRow::read,
                )
                .optional()?,
            Key::Uuid(uuid) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM key_value WHERE resource = ?1 AND uuid = ?2"
                    ),
                    params![resource.tag(), uuid.to_string()],
                    RawRow::read,
                )
                .optional()?,
        };
        raw.map(RawRow::into_entry).transpose()
    }

    fn insert(&mut self, entry: NewEntry) -> StoreResult<KeyValueEntry> {
        let id = match entry.id {
            Some(id) => id,
            None => self.next_id()?,
        };
        let at = to_nanos(entry.at)?;
        let result = self.conn.execute(
            "INSERT INTO key_value (resource, id, uuid, value, created_on, created_by, \
             changed_on, changed_by, expires_on) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5, ?6, ?7)",
            params![
                entry.resource.tag(),
                id,
                entry.uuid.to_string(),
                entry.value,
                at,
                entry.actor.map(|u| u.0),
                entry.expires_on.map(expiry_nanos),
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::Duplicate {
                    resource: entry.resource,
                    key: entry.conflict_key(),
                });
            }
            Err(err) => return Err(err.into()),
        }
        self.conn.execute(
            "UPDATE key_value_seq SET next_id = MAX(next_id, ?1 + 1) WHERE singleton = 0",
            params![id],
        )?;

        let mut row = entry.into_entry(id);
        row.expires_on = row.expires_on.map(|at| from_nanos(expiry_nanos(at)));
        Ok(row)
    }

    fn update(&mut self, entry: &KeyValueEntry) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE key_value SET value = ?1, changed_on = ?2, changed_by = ?3, expires_on = ?4 \
             WHERE resource = ?5 AND id = ?6",
            params![
                entry.value,
                to_nanos(entry.changed_on)?,
                entry.changed_by.map(|u| u.0),
                entry.expires_on.map(expiry_nanos),
                entry.resource.tag(),
                entry.id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn set_expiry(
        &mut self,
        resource: Resource,
        id: i64,
        expires_on: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE key_value SET expires_on = ?1 WHERE resource = ?2 AND id = ?3",
            params![expires_on.map(expiry_nanos), resource.tag(), id],
        )?;
        Ok(changed > 0)
    }

    fn delete(&mut self, resource: Resource, key: &Key) -> StoreResult<bool> {
        let removed = match key {
            Key::Id(id) => self.conn.execute(
                "DELETE FROM key_value WHERE resource = ?1 AND id = ?2",
                params![resource.tag(), id],
            )?,
            Key::Uuid(uuid) => self.conn.execute(
                "DELETE FROM key_value WHERE resource = ?1 AND uuid = ?2",
                params![resource.tag(), uuid.to_string()],
            )?,
        };
        Ok(removed > 0)
    }

    fn delete_expired(&mut self, resource: Resource, now: DateTime<Utc>) -> StoreResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM key_value \
             WHERE resource = ?1 AND expires_on IS NOT NULL AND expires_on <= ?2",
            params![resource.tag(), to_nanos(now)?],
        )?)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        self.done = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.done {
            if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
                debug!(error = %err, "sqlite rollback failed");
            }
        }
    }
}

struct RawRow {
    resource: String,
    id: i64,
    uuid: String,
    value: Vec<u8>,
    created_on: i64,
    created_by: Option<i64>,
    changed_on: i64,
    changed_by: Option<i64>,
    expires_on: Option<i64>,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            resource: row.get(0)?,
            id: row.get(1)?,
            uuid: row.get(2)?,
            value: row.get(3)?,
            created_on: row.get(4)?,
            created_by: row.get(5)?,
            changed_on: row.get(6)?,
            changed_by: row.get(7)?,
            expires_on: row.get(8)?,
        })
    }

    fn into_entry(self) -> StoreResult<KeyValueEntry> {
        let resource = self
            .resource
            .parse::<Resource>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let uuid = Uuid::parse_str(&self.uuid)
            .map_err(|e| StoreError::Corrupt(format!("uuid {:?}: {e}", self.uuid)))?;
        Ok(KeyValueEntry {
            id: self.id,
            uuid,
            resource,
            value: self.value,
            created_on: from_nanos(self.created_on),
            created_by: self.created_by.map(UserId),
            changed_on: from_nanos(self.changed_on),
            changed_by: self.changed_by.map(UserId),
            expires_on: self.expires_on.map(from_nanos),
        })
    }
}

fn to_nanos(at: DateTime<Utc>) -> StoreResult<i64> {
    at.timestamp_nanos_opt()
        .ok_or_else(|| StoreError::Database(format!("timestamp out of range: {at}")))
}

fn expiry_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .unwrap_or(if at.timestamp() > 0 { i64::MAX } else { i64::MIN })
}

fn from_nanos(ns: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ns)
}
