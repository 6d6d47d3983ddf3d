//! Module of MemStorage, the local store of a ring node.

pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;
use crate::error::Result;
pub use crate::storage::memory::MemStorage;

/// Key value storage interface
#[async_trait]
pub trait KvStorageInterface<V> {
    /// Get a cache entry by `key`.
    async fn get(&self, key: &Did) -> Result<Option<V>>;

    /// Put `entry` in the cache under `key`.
    async fn put(&self, key: &Did, value: &V) -> Result<()>;

    /// Every entry.
    async fn get_all(&self) -> Result<Vec<(Did, V)>>;

    /// Every key.
    async fn keys(&self) -> Result<Vec<Did>>;

    /// Remove an `entry` by `key`.
    async fn remove(&self, key: &Did) -> Result<()>;

    /// Delete all values.
    async fn clear(&self) -> Result<()>;

    /// Get the current storage usage.
    async fn count(&self) -> Result<u32>;
}

/// A value held by the node responsible for its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    /// The application value.
    pub value: serde_json::Value,
    /// Hash of `value`, compared during replication.
    pub hash: Did,
    /// Last read or write, epoch ms.
    pub touched: u64,
}
