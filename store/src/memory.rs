//! In-process shared store with TTL support.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use fxgate_common::{expires_at, Clock, SystemClock, Timestamp};
use tracing::debug;

use crate::error::StoreResult;
use crate::shared::{Script, ScriptState, SharedStore};

/// Stored entry with optional expiry.
#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Option<Timestamp>,
}

impl<T> Entry<T> {
    fn new(value: T, now: Timestamp, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| expires_at(now, ttl)),
        }
    }

    fn is_valid(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Thread-safe in-process store.
///
/// Scripts run while the key's map shard is write-locked, so concurrent `eval` calls
/// on one key never interleave.
#[derive(Debug)]
pub struct MemoryStore {
    values: DashMap<String, Entry<Vec<u8>>>,
    scripted: DashMap<String, Entry<ScriptState>>,
    clock: Arc<dyn Clock>,
    reads: AtomicU64,
}

impl MemoryStore {
    /// Create a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose expiry follows `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: DashMap::new(),
            scripted: DashMap::new(),
            clock,
            reads: AtomicU64::new(0),
        }
    }

    /// Whether a live value exists at `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.values.get(key).is_some_and(|e| e.is_valid(now))
    }

    /// Number of `get` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Current numeric state under a scripted key, if live.
    pub fn script_state(&self, key: &str) -> Option<ScriptState> {
        let now = self.clock.now();
        self.scripted
            .get(key)
            .filter(|e| e.is_valid(now))
            .map(|e| e.value.clone())
    }

    /// Number of stored values, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        if let Some(entry) = self.values.get(key) {
            if entry.is_valid(now) {
                return Ok(Some(entry.value.clone()));
            }
        }

        if self.values.remove_if(key, |_, e| !e.is_valid(now)).is_some() {
            debug!(key, "Evicted expired entry");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry::new(value, self.clock.now(), ttl);
        self.values.insert(key.to_string(), entry);
        Ok(())
    }

    async fn eval(
        &self,
        script: &Script,
        key: &str,
        args: &[f64],
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entry = self
            .scripted
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(ScriptState::new(), now, ttl));

        if !entry.is_valid(now) {
            entry.value.clear();
        }

        let result = (script.apply)(&mut entry.value, args);
        entry.expires_at = ttl.map(|ttl| expires_at(now, ttl));

        Ok(result)
    }
}
