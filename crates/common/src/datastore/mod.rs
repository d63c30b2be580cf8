//! Key-value storage engines backing the KeyBook

mod memory;
mod sqlite;

use std::fmt;

use async_trait::async_trait;

pub use memory::MemoryDatastore;
pub use sqlite::SqliteDatastore;

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("datastore is closed")]
    Closed,
    #[error("invalid datastore key: {0}")]
    InvalidKey(String),
    #[error("datastore lock poisoned: {0}")]
    Lock(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A hierarchical datastore key, `/`-separated and always absolute
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(pub(crate) String);

impl Key {
    pub fn new(key: impl Into<String>) -> Result<Self, DatastoreError> {
        let key = key.into();
        if !key.starts_with('/') || key.len() < 2 || key.ends_with('/') {
            return Err(DatastoreError::InvalidKey(key));
        }
        Ok(Self(key))
    }

    /// Append a path segment
    pub fn child(&self, name: impl fmt::Display) -> Key {
        Key(format!("{}/{}", self.0, name))
    }

    /// The last path segment
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// The key with its last segment removed, if any remains
    pub fn parent(&self) -> Option<Key> {
        let (parent, _) = self.0.rsplit_once('/')?;
        (!parent.is_empty()).then(|| Key(parent.to_string()))
    }

    /// Prefix matching every descendant of this key and nothing else
    pub fn descendant_prefix(&self) -> String {
        format!("{}/", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Key, Vec<u8>),
    Delete(Key),
}

/// A set of writes applied all-or-nothing by [`Datastore::commit`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Key, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Put(key, value));
        self
    }

    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.ops.push(BatchOp::Delete(key));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

#[async_trait]
pub trait Datastore: Send + Sync + fmt::Debug + Clone + 'static {
    /// The value stored at `key`, `None` if there is none
    async fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, DatastoreError>;

    /// Insert or overwrite
    async fn put(&self, key: &Key, value: Vec<u8>) -> Result<(), DatastoreError>;

    async fn has(&self, key: &Key) -> Result<bool, DatastoreError>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete(&self, key: &Key) -> Result<(), DatastoreError>;

    /// Every key starting with `prefix`, in key order
    async fn query_keys(&self, prefix: &str) -> Result<Vec<Key>, DatastoreError>;

    /// Apply every operation of `batch` or none of them
    async fn commit(&self, batch: Batch) -> Result<(), DatastoreError>;

    /// Release the underlying handle. Calling it again is a no-op.
    async fn close(&self) -> Result<(), DatastoreError>;
}
