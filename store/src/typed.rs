//! Typed cache over the raw shared store.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::shared::SharedStore;

/// Cache of values of one type, JSON-encoded at the store boundary.
pub struct TypedCache<V> {
    store: Arc<dyn SharedStore>,
    _value: PhantomData<fn() -> V>,
}

impl<V> TypedCache<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Create a typed view over `store`.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            _value: PhantomData,
        }
    }

    /// Get and decode the value at `key`.
    pub async fn get(&self, key: &str) -> StoreResult<Option<V>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    /// Encode and write `value` at `key`.
    pub async fn set(&self, key: &str, value: &V, ttl: Option<Duration>) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, bytes, ttl).await
    }

    /// The underlying raw store.
    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }
}

impl<V> Clone for TypedCache<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for TypedCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCache")
            .field("store", &self.store)
            .finish()
    }
}
