//! Session cache: fast key-value store with per-key TTL.
//!
//! # Key Patterns
//!
//! - `refresh:{token}` - Owner user id of an issued refresh token (UUID string)
//! - `user:{id}` - JSON snapshot of a [`User`], may be stale
//!
//! Refresh tokens exist only here. There is no durable record of them, so a
//! miss under `refresh:` is final, while a miss under `user:` is answered by
//! the durable user store.
//!
//! Lookups return `Result<Option<_>, CacheError>`: `Ok(None)` is a miss,
//! `Err(_)` is a store failure. Callers branch on the difference.

pub mod redis;

use crate::models::User;
use crate::observability::metrics::record_cache_lookup;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use self::redis::RedisSessionCache;

pub const REFRESH_KEY_PREFIX: &str = "refresh:";
pub const USER_KEY_PREFIX: &str = "user:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Transport or server failure; the key may or may not exist.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("cache value malformed: {0}")]
    Serialization(String),
}

/// Raw session cache contract.
///
/// Operations are independent; no cross-key transactionality is assumed.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Read a key. `Ok(None)` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a key with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically read and remove a key.
    async fn take(&self, key: &str) -> Result<Option<String>, CacheError>;
}

pub fn refresh_key(refresh_token: &str) -> String {
    format!("{REFRESH_KEY_PREFIX}{refresh_token}")
}

pub fn user_key(user_id: Uuid) -> String {
    format!("{USER_KEY_PREFIX}{user_id}")
}

/// Typed view over the two session key families.
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
    refresh_ttl: Duration,
    user_ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn SessionCache>, refresh_ttl: Duration, user_ttl: Duration) -> Self {
        Self {
            cache,
            refresh_ttl,
            user_ttl,
        }
    }

    /// Resolve the user id that owns a refresh token.
    pub async fn refresh_owner(&self, refresh_token: &str) -> Result<Option<Uuid>, CacheError> {
        let result = self.cache.get(&refresh_key(refresh_token)).await;
        record_lookup("refresh", &result);
        result?.map(|raw| parse_owner(&raw)).transpose()
    }

    /// Resolve and remove a refresh token in one cache operation.
    pub async fn take_refresh_owner(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Uuid>, CacheError> {
        let result = self.cache.take(&refresh_key(refresh_token)).await;
        record_lookup("refresh", &result);
        result?.map(|raw| parse_owner(&raw)).transpose()
    }

    pub async fn store_refresh_token(
        &self,
        refresh_token: &str,
        user_id: Uuid,
    ) -> Result<(), CacheError> {
        self.cache
            .set(
                &refresh_key(refresh_token),
                &user_id.to_string(),
                self.refresh_ttl,
            )
            .await
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), CacheError> {
        self.cache.delete(&refresh_key(refresh_token)).await
    }

    /// Read the cached user snapshot.
    pub async fn cached_user(&self, user_id: Uuid) -> Result<Option<User>, CacheError> {
        let result = self.cache.get(&user_key(user_id)).await;
        record_lookup("user", &result);
        result?
            .map(|raw| {
                serde_json::from_str::<User>(&raw)
                    .map_err(|e| CacheError::Serialization(format!("user snapshot: {e}")))
            })
            .transpose()
    }

    pub async fn store_user(&self, user: &User) -> Result<(), CacheError> {
        let json = serde_json::to_string(user)
            .map_err(|e| CacheError::Serialization(format!("user snapshot: {e}")))?;
        self.cache.set(&user_key(user.id), &json, self.user_ttl).await
    }

    /// Drop a user snapshot so the next read goes to the store.
    pub async fn evict_user(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.cache.delete(&user_key(user_id)).await
    }
}

fn parse_owner(raw: &str) -> Result<Uuid, CacheError> {
    Uuid::parse_str(raw)
        .map_err(|e| CacheError::Serialization(format!("refresh token owner: {e}")))
}

fn record_lookup(family: &str, result: &Result<Option<String>, CacheError>) {
    let outcome = match result {
        Ok(Some(_)) => "hit",
        Ok(None) => "miss",
        Err(_) => "error",
    };
    record_cache_lookup(family, outcome);
}
