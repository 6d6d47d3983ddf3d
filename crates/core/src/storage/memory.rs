//! In memory key value backend.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::dht::Did;
use crate::error::Result;
use crate::storage::KvStorageInterface;

/// In memory storage backed by a [DashMap]. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemStorage<V>
where V: Clone
{
    table: DashMap<Did, V>,
}

impl<V> MemStorage<V>
where V: Clone
{
    /// Create an empty storage.
    pub fn new() -> Self {
        Self {
            table: DashMap::default(),
        }
    }
}

#[async_trait]
impl<V> KvStorageInterface<V> for MemStorage<V>
where V: Clone + Send + Sync
{
    async fn get(&self, key: &Did) -> Result<Option<V>> {
        Ok(self.table.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &Did, value: &V) -> Result<()> {
        self.table.insert(key.clone(), value.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<(Did, V)>> {
        Ok(self
            .table
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().clone()))
            .collect())
    }

    async fn keys(&self) -> Result<Vec<Did>> {
        Ok(self.table.iter().map(|kv| kv.key().clone()).collect())
    }

    async fn remove(&self, key: &Did) -> Result<()> {
        self.table.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.table.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u32> {
        Ok(self.table.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memstorage_basic_interface_should_work() {
        let store = MemStorage::new();
        let key = Did::from(42u32);

        assert_eq!(store.get(&key).await.unwrap(), None);

        store.put(&key, &"value 1".to_string()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some("value 1".into()));

        store.put(&key, &"value 2".to_string()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some("value 2".into()));
        assert_eq!(store.keys().await.unwrap(), vec![key.clone()]);
        assert_eq!(store.count().await.unwrap(), 1);

        store.remove(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
