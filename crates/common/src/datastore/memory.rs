use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Batch, BatchOp, Datastore, DatastoreError, Key};

/// Datastore held entirely in memory
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatastore {
    inner: Arc<RwLock<MemoryDatastoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryDatastoreInner {
    entries: BTreeMap<Key, Vec<u8>>,
    closed: bool,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&MemoryDatastoreInner) -> T,
    ) -> Result<T, DatastoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| DatastoreError::Lock(format!("failed to acquire read lock: {}", e)))?;
        if inner.closed {
            return Err(DatastoreError::Closed);
        }
        Ok(f(&inner))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut MemoryDatastoreInner) -> T,
    ) -> Result<T, DatastoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| DatastoreError::Lock(format!("failed to acquire write lock: {}", e)))?;
        if inner.closed {
            return Err(DatastoreError::Closed);
        }
        Ok(f(&mut inner))
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, DatastoreError> {
        self.read(|inner| inner.entries.get(key).cloned())
    }

    async fn put(&self, key: &Key, value: Vec<u8>) -> Result<(), DatastoreError> {
        self.write(|inner| {
            inner.entries.insert(key.clone(), value);
        })
    }

    async fn has(&self, key: &Key) -> Result<bool, DatastoreError> {
        self.read(|inner| inner.entries.contains_key(key))
    }

    async fn delete(&self, key: &Key) -> Result<(), DatastoreError> {
        self.write(|inner| {
            inner.entries.remove(key);
        })
    }

    async fn query_keys(&self, prefix: &str) -> Result<Vec<Key>, DatastoreError> {
        self.read(|inner| {
            inner
                .entries
                .keys()
                .filter(|key| key.as_str().starts_with(prefix))
                .cloned()
                .collect()
        })
    }

    async fn commit(&self, batch: Batch) -> Result<(), DatastoreError> {
        // a single write guard makes the whole batch visible at once
        self.write(|inner| {
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put(key, value) => {
                        inner.entries.insert(key, value);
                    }
                    BatchOp::Delete(key) => {
                        inner.entries.remove(&key);
                    }
                }
            }
        })
    }

    async fn close(&self) -> Result<(), DatastoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| DatastoreError::Lock(format!("failed to acquire write lock: {}", e)))?;
        inner.closed = true;
        inner.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_prefix_query() {
        let store = MemoryDatastore::new();
        store.put(&key("/a/b/one"), vec![1]).await.unwrap();
        store.put(&key("/a/b/two"), vec![2]).await.unwrap();
        store.put(&key("/a/bc/three"), vec![3]).await.unwrap();

        let keys = store.query_keys("/a/b/").await.unwrap();
        assert_eq!(keys, vec![key("/a/b/one"), key("/a/b/two")]);
        assert_eq!(store.query_keys("/a/b").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_and_close() {
        let store = MemoryDatastore::new();
        store.put(&key("/x"), vec![0]).await.unwrap();

        let mut batch = Batch::new();
        batch.put(key("/y"), vec![1]).delete(key("/x"));
        store.commit(batch).await.unwrap();

        assert!(!store.has(&key("/x")).await.unwrap());
        assert_eq!(store.get(&key("/y")).await.unwrap(), Some(vec![1]));

        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(
            store.get(&key("/y")).await,
            Err(DatastoreError::Closed)
        ));
    }
}
