//! The shared store port and atomic scripts.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Numeric fields kept under one scripted key.
///
/// Mirrors a Redis hash of numeric fields; in-process stores hold it directly.
pub type ScriptState = HashMap<String, f64>;

/// A read-modify-write transition executed atomically by the store.
///
/// Every script exists in two equivalent forms: Lua source run server-side by Redis,
/// and a Rust function applied by in-process stores while they hold the key's lock.
/// Both receive the numeric arguments in order. Redis backends append the TTL in
/// whole seconds as one extra trailing argument (`0` for no expiry), which the Lua
/// source applies with `EXPIRE`.
#[derive(Clone, Copy)]
pub struct Script {
    /// Name used in logs and errors.
    pub name: &'static str,
    /// Lua source, executed with `KEYS[1]` = key.
    pub lua: &'static str,
    /// In-process equivalent of `lua`.
    pub apply: fn(&mut ScriptState, &[f64]) -> bool,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Port for the shared key-value store.
///
/// Plain reads and writes are independently atomic per key; there are no multi-key
/// transactions. `eval` is the single atomic read-modify-write primitive.
#[async_trait]
pub trait SharedStore: Send + Sync + fmt::Debug {
    /// Read the raw value at `key`. Expired entries read as absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `value` at `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()>;

    /// Run `script` atomically against the state at `key`.
    ///
    /// The updated state is persisted regardless of the boolean outcome, and its
    /// expiry is reset to `ttl`.
    async fn eval(
        &self,
        script: &Script,
        key: &str,
        args: &[f64],
        ttl: Option<Duration>,
    ) -> StoreResult<bool>;
}
