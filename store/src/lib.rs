//! FxGate Shared Store
//!
//! The key-value store shared by every FxGate process: snapshot caching, the
//! currency catalog and the limiter's bucket state all live here.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process, for single-node deployments and tests
//! - [`RedisStore`]: networked, shared across processes and machines
//!
//! # Example
//!
//! ```rust,ignore
//! use fxgate_store::{RedisStore, RedisStoreConfig, TypedCache};
//!
//! let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await?);
//! let cache: TypedCache<Vec<String>> = TypedCache::new(store);
//! cache.set("available:currencies", &codes, Some(ttl)).await?;
//! ```

pub mod error;
pub mod shared;
pub mod typed;
pub mod memory;
pub mod redis_store;

pub use error::{StoreError, StoreResult};
pub use shared::{Script, ScriptState, SharedStore};
pub use typed::TypedCache;
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};
