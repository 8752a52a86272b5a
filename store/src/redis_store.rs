//! Redis-backed shared store.
//!
//! Lets every FxGate instance share cached snapshots, the currency catalog and
//! limiter bucket state.
//!
//! ## Layout
//!
//! - Plain values: `SET {prefix}{key}` with `EX` when a TTL is given
//! - Scripted state: a hash at `{prefix}{key}`, mutated only by Lua scripts
//!
//! ## Atomicity
//!
//! Scripts run through `EVALSHA` (falling back to `EVAL` on a cold script cache), so
//! Redis executes each read-modify-write without interleaving other commands. Callers
//! on different machines therefore never race on the same bucket.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use fxgate_common::ttl_seconds;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::shared::{Script, SharedStore};

/// Configuration for Redis storage.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Prefix prepended to every key (default: "fxgate:").
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "fxgate:".to_string(),
        }
    }
}

/// Shared store on a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
    scripts: std::sync::Arc<DashMap<&'static str, redis::Script>>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            config,
            scripts: std::sync::Arc::new(DashMap::new()),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Compiled script handle; the SHA1 is computed once per script.
    fn compiled(&self, script: &Script) -> redis::Script {
        self.scripts
            .entry(script.name)
            .or_insert_with(|| redis::Script::new(script.lua))
            .clone()
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let bytes: Option<Vec<u8>> = conn.get(self.key(key)).await?;
        Ok(bytes)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let key = self.key(key);

        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(&key, value, ttl_seconds(ttl)).await?,
            None => conn.set::<_, _, ()>(&key, value).await?,
        }

        Ok(())
    }

    async fn eval(
        &self,
        script: &Script,
        key: &str,
        args: &[f64],
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let compiled = self.compiled(script);

        let mut invocation = compiled.key(self.key(key));
        for arg in args {
            invocation.arg(*arg);
        }
        invocation.arg(ttl.map_or(0, ttl_seconds));

        let reply: i64 = invocation.invoke_async(&mut conn).await?;
        debug!(script = script.name, key, reply, "Script executed");

        match reply {
            1 => Ok(true),
            0 => Ok(false),
            other => Err(StoreError::UnexpectedReply {
                script: script.name,
                reply: other.to_string(),
            }),
        }
    }
}
