use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::{Client, Connection};
use tracing::{debug, warn};

use crate::error::FastStoreError;
use crate::fast::FastStore;

/// How long a failed connect keeps the store marked unavailable.
const RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Pool {
    idle: Option<Connection>,
    down_until: Option<Instant>,
}

/// [`FastStore`] backed by a Redis server.
///
/// The connection is opened lazily on first use and cached. A connection is
/// checked out of the cache for the duration of a command, so no in-process
/// lock is held across a network round-trip. After a failed connect the
/// store reports itself unavailable for a short back-off instead of paying
/// the connect timeout on every call.
pub struct RedisFastStore {
    client: Client,
    timeout: Duration,
    pool: Mutex<Pool>,
}

impl RedisFastStore {
    /// Parse `url` (`redis://host:port/db`). Does not connect.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, FastStoreError> {
        let client = Client::open(url)
            .map_err(|e| FastStoreError::Config(format!("invalid redis url {url:?}: {e}")))?;
        Ok(Self {
            client,
            timeout,
            pool: Mutex::new(Pool::default()),
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T, FastStoreError> {
        let mut conn = self.checkout()?;
        match f(&mut conn) {
            Ok(value) => {
                self.checkin(conn);
                Ok(value)
            }
            Err(err) => {
                // The connection may be mid-reply; never reuse it.
                if err.is_io_error() || err.is_timeout() || err.is_connection_dropped() {
                    self.mark_down();
                }
                Err(err.into())
            }
        }
    }

    fn checkout(&self) -> Result<Connection, FastStoreError> {
        {
            let mut pool = self.lock_pool();
            if let Some(until) = pool.down_until {
                if Instant::now() < until {
                    return Err(FastStoreError::Unavailable("backing off after failure".into()));
                }
                pool.down_until = None;
            }
            if let Some(conn) = pool.idle.take() {
                return Ok(conn);
            }
        }
        match self.connect() {
            Ok(conn) => Ok(conn),
            Err(err) => {
                warn!(error = %err, "redis connect failed");
                self.mark_down();
                Err(FastStoreError::Unavailable(err.to_string()))
            }
        }
    }

    fn connect(&self) -> redis::RedisResult<Connection> {
        let conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        debug!("opened redis connection");
        Ok(conn)
    }

    fn checkin(&self, conn: Connection) {
        let mut pool = self.lock_pool();
        if pool.idle.is_none() {
            pool.idle = Some(conn);
        }
    }

    fn mark_down(&self) {
        let mut pool = self.lock_pool();
        pool.idle = None;
        pool.down_until = Some(Instant::now() + RETRY_AFTER);
    }

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FastStore for RedisFastStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn is_available(&self) -> bool {
        self.with_connection(|conn| redis::cmd("PING").query::<String>(conn))
            .is_ok()
    }

    fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, FastStoreError> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = self.with_connection(|conn| {
            redis::cmd("SET")
                .arg(key)
                .arg(1)
                .arg("NX")
                .arg("PX")
                .arg(millis)
                .query(conn)
        })?;
        Ok(reply.is_some())
    }

    fn delete(&self, key: &str) -> Result<(), FastStoreError> {
        self.with_connection(|conn| redis::cmd("DEL").arg(key).query::<i64>(conn))?;
        Ok(())
    }

    fn shutdown(&self) {
        let mut pool = self.lock_pool();
        pool.idle = None;
        pool.down_until = None;
    }
}

impl std::fmt::Debug for RedisFastStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFastStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
