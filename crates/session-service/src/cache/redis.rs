//! Redis-backed session cache.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe for
//! concurrent use, so every operation clones it instead of sharing it behind
//! a lock.

use super::{CacheError, SessionCache};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::time::Duration;
use tracing::{error, instrument, warn};

#[derive(Clone)]
pub struct RedisSessionCache {
    connection: MultiplexedConnection,
}

impl RedisSessionCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the URL is malformed or the
    /// server cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url).map_err(|e| {
            // The URL may carry credentials; only the error is logged.
            error!(target: "session.cache", error = %e, "Failed to open Redis client");
            CacheError::Unavailable(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "session.cache", error = %e, "Failed to connect to Redis");
                CacheError::Unavailable(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { connection })
    }
}

/// Redis rejects `EX 0`; sub-second TTLs round up to one second.
fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// `SET key value EX <secs>`.
fn set_command(key: &str, value: &str, ttl: Duration) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value).arg("EX").arg(expiry_seconds(ttl));
    cmd
}

fn unavailable(operation: &str, e: redis::RedisError) -> CacheError {
    warn!(target: "session.cache", operation, error = %e, "Redis command failed");
    CacheError::Unavailable(format!("{operation} failed: {e}"))
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    #[instrument(skip_all)]
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("GET", e))
    }

    #[instrument(skip_all, fields(ttl_seconds = expiry_seconds(ttl)))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        set_command(key, value, ttl)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| unavailable("SET", e))
    }

    #[instrument(skip_all)]
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("DEL", e))?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("GETDEL", e))
    }
}
