//! In-memory session cache for tests.
//!
//! Implements [`SessionCache`] with per-key TTL measured on the Tokio clock,
//! so `tokio::time::pause()` / `advance()` drive expiry. Failures and slow
//! writes can be injected per key prefix.
//!
//! # Example
//!
//! ```rust,ignore
//! use session_test_utils::MockSessionCache;
//!
//! let cache = MockSessionCache::new();
//! cache.fail_reads_for("user:");
//!
//! // `user:` lookups now return CacheError::Unavailable
//! ```

use async_trait::async_trait;
use session_service::cache::{CacheError, SessionCache};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Cache operation kinds, for call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Get,
    Set,
    Delete,
    Take,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    unavailable: bool,
    failing_read_prefixes: Vec<String>,
    failing_write_prefixes: Vec<String>,
    write_delay: Option<Duration>,
    calls: HashMap<CacheOp, usize>,
    write_log: Vec<String>,
}

impl Inner {
    fn live(&mut self, key: &str) -> Option<&Entry> {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now());
        if expired {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }

    fn read_fails(&self, key: &str) -> bool {
        self.unavailable
            || self
                .failing_read_prefixes
                .iter()
                .any(|prefix| key.starts_with(prefix.as_str()))
    }

    fn write_fails(&self, key: &str) -> bool {
        self.unavailable
            || self
                .failing_write_prefixes
                .iter()
                .any(|prefix| key.starts_with(prefix.as_str()))
    }

    fn count(&mut self, op: CacheOp) {
        *self.calls.entry(op).or_insert(0) += 1;
    }
}

fn injected(op: CacheOp, key: &str) -> CacheError {
    CacheError::Unavailable(format!("injected {op:?} failure for {key}"))
}

/// In-memory [`SessionCache`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockSessionCache {
    inner: Arc<Mutex<Inner>>,
}

impl MockSessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `CacheError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unwrap().unavailable = unavailable;
    }

    /// Fail `get` and `take` for keys starting with `prefix`.
    pub fn fail_reads_for(&self, prefix: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_read_prefixes
            .push(prefix.to_string());
    }

    /// Fail `set` for keys starting with `prefix`.
    pub fn fail_writes_for(&self, prefix: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_write_prefixes
            .push(prefix.to_string());
    }

    /// Delay every `set` by `delay` before it is applied.
    pub fn set_write_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().write_delay = Some(delay);
    }

    /// Clear injected failures and delays. Stored entries are kept.
    pub fn heal(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.unavailable = false;
        inner.failing_read_prefixes.clear();
        inner.failing_write_prefixes.clear();
        inner.write_delay = None;
    }

    /// Store a raw value, bypassing failure injection.
    pub fn insert(&self, key: &str, value: &str, ttl: Duration) {
        self.inner.lock().unwrap().entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove a key, bypassing failure injection.
    pub fn remove(&self, key: &str) {
        self.inner.lock().unwrap().entries.remove(key);
    }

    /// Current value of a live key, without counting a call.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .live(key)
            .map(|entry| entry.value.clone())
    }

    /// TTL the key was last written with, if it is still live.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.inner.lock().unwrap().live(key).map(|entry| entry.ttl)
    }

    /// Live keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();
        let mut keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn calls(&self, op: CacheOp) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Keys passed to `set`, in call order, including failed writes.
    pub fn write_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().write_log.clone()
    }
}

#[async_trait]
impl SessionCache for MockSessionCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut inner = self.inner.lock().unwrap();
        inner.count(CacheOp::Get);
        if inner.read_fails(key) {
            return Err(injected(CacheOp::Get, key));
        }
        Ok(inner.live(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.count(CacheOp::Set);
            inner.write_log.push(key.to_string());
            inner.write_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.write_fails(key) {
            return Err(injected(CacheOp::Set, key));
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().unwrap();
        inner.count(CacheOp::Delete);
        if inner.unavailable {
            return Err(injected(CacheOp::Delete, key));
        }
        inner.entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut inner = self.inner.lock().unwrap();
        inner.count(CacheOp::Take);
        if inner.read_fails(key) {
            return Err(injected(CacheOp::Take, key));
        }
        let value = inner.live(key).map(|entry| entry.value.clone());
        inner.entries.remove(key);
        Ok(value)
    }
}
