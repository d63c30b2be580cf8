//! Persistent key custody for Threads and Logs
//!
//! Layout under the `/thread/keys` root:
//!
//! ```text
//! /thread/keys/<thread>/read          Thread read key
//! /thread/keys/<thread>/repl          Thread service key
//! /thread/keys/<thread>/<log>:pub     marshaled Log public key
//! /thread/keys/<thread>/<log>:priv    marshaled Log private key (owned Logs only)
//! ```
//!
//! A missing entry is a normal state and reads return `None` for it.

use std::collections::BTreeSet;

use crate::crypto::{PublicKey, Secret, SecretKey};
use crate::datastore::{Batch, Datastore, DatastoreError, Key};
use crate::thread::{LogId, ThreadId, ThreadKey};

const ROOT: &str = "/thread/keys";
const READ_KEY: &str = "read";
const SERVICE_KEY: &str = "repl";
const PUB_SUFFIX: &str = ":pub";
const PRIV_SUFFIX: &str = ":priv";

#[derive(Debug, thiserror::Error)]
pub enum KeyBookError {
    #[error("key does not derive log {0}")]
    KeyMismatch(LogId),
    #[error("storage error: {0}")]
    Storage(#[from] DatastoreError),
    #[error("corrupt entry at {key}: {reason}")]
    Corrupt { key: Key, reason: String },
}

/// Thread and Log keys held by this peer
///
/// The KeyBook is the only writer of its datastore. Clones share the same
/// store handle.
#[derive(Debug, Clone)]
pub struct KeyBook<D: Datastore> {
    store: D,
    root: Key,
}

impl<D: Datastore> KeyBook<D> {
    pub fn new(store: D) -> Self {
        Self {
            store,
            root: Key(ROOT.to_string()),
        }
    }

    fn thread_key(&self, thread: &ThreadId) -> Key {
        self.root.child(thread)
    }

    fn log_key(&self, thread: &ThreadId, log: &LogId, suffix: &str) -> Key {
        self.thread_key(thread).child(format!("{}{}", log, suffix))
    }

    async fn get_secret(&self, key: &Key) -> Result<Option<Secret>, KeyBookError> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        Secret::from_slice(&bytes)
            .map(Some)
            .map_err(|e| corrupt(key, e))
    }

    /// Public key of a Log
    pub async fn pub_key(
        &self,
        thread: &ThreadId,
        log: &LogId,
    ) -> Result<Option<PublicKey>, KeyBookError> {
        let key = self.log_key(thread, log, PUB_SUFFIX);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        PublicKey::unmarshal(&bytes)
            .map(Some)
            .map_err(|e| corrupt(&key, e))
    }

    /// Private key of a Log, present only for Logs this peer owns
    pub async fn priv_key(
        &self,
        thread: &ThreadId,
        log: &LogId,
    ) -> Result<Option<SecretKey>, KeyBookError> {
        let key = self.log_key(thread, log, PRIV_SUFFIX);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        SecretKey::unmarshal(&bytes)
            .map(Some)
            .map_err(|e| corrupt(&key, e))
    }

    /// Record the public key of `log`; fails without writing unless `log`
    /// is derived from `pub_key`
    pub async fn add_pub_key(
        &self,
        thread: &ThreadId,
        log: &LogId,
        pub_key: &PublicKey,
    ) -> Result<(), KeyBookError> {
        if !log.matches(pub_key) {
            return Err(KeyBookError::KeyMismatch(log.clone()));
        }
        self.store
            .put(&self.log_key(thread, log, PUB_SUFFIX), pub_key.marshal())
            .await?;
        Ok(())
    }

    /// Record the private key of `log`, with the same derivation check as
    /// [`KeyBook::add_pub_key`]
    pub async fn add_priv_key(
        &self,
        thread: &ThreadId,
        log: &LogId,
        priv_key: &SecretKey,
    ) -> Result<(), KeyBookError> {
        if !log.matches(&priv_key.public()) {
            return Err(KeyBookError::KeyMismatch(log.clone()));
        }
        self.store
            .put(&self.log_key(thread, log, PRIV_SUFFIX), priv_key.marshal())
            .await?;
        Ok(())
    }

    pub async fn read_key(&self, thread: &ThreadId) -> Result<Option<Secret>, KeyBookError> {
        self.get_secret(&self.thread_key(thread).child(READ_KEY))
            .await
    }

    pub async fn service_key(&self, thread: &ThreadId) -> Result<Option<Secret>, KeyBookError> {
        self.get_secret(&self.thread_key(thread).child(SERVICE_KEY))
            .await
    }

    pub async fn add_read_key(&self, thread: &ThreadId, key: &Secret) -> Result<(), KeyBookError> {
        self.store
            .put(&self.thread_key(thread).child(READ_KEY), key.bytes().to_vec())
            .await?;
        Ok(())
    }

    pub async fn add_service_key(
        &self,
        thread: &ThreadId,
        key: &Secret,
    ) -> Result<(), KeyBookError> {
        self.store
            .put(
                &self.thread_key(thread).child(SERVICE_KEY),
                key.bytes().to_vec(),
            )
            .await?;
        Ok(())
    }

    /// The Thread's keys as a [`ThreadKey`]; `None` without a service key
    pub async fn thread_keys(&self, thread: &ThreadId) -> Result<Option<ThreadKey>, KeyBookError> {
        let Some(service) = self.service_key(thread).await? else {
            return Ok(None);
        };
        let read = self.read_key(thread).await?;
        Ok(Some(ThreadKey::new(service, read)))
    }

    /// Store both halves of a [`ThreadKey`] in one batch
    pub async fn add_thread_keys(
        &self,
        thread: &ThreadId,
        key: &ThreadKey,
    ) -> Result<(), KeyBookError> {
        let mut batch = Batch::new();
        batch.put(
            self.thread_key(thread).child(SERVICE_KEY),
            key.service().bytes().to_vec(),
        );
        if let Some(read) = key.read() {
            batch.put(self.thread_key(thread).child(READ_KEY), read.bytes().to_vec());
        }
        self.store.commit(batch).await?;
        Ok(())
    }

    /// Threads this peer can replicate, i.e. those with a service key
    pub async fn threads(&self) -> Result<BTreeSet<ThreadId>, KeyBookError> {
        let mut threads = BTreeSet::new();
        for key in self.store.query_keys(&self.root.descendant_prefix()).await? {
            if key.name() != SERVICE_KEY {
                continue;
            }
            let Some(parent) = key.parent() else { continue };
            if parent.parent().as_ref() != Some(&self.root) {
                continue;
            }
            let id = parent.name().parse().map_err(|e| corrupt(&key, e))?;
            threads.insert(id);
        }
        Ok(threads)
    }

    /// Logs of `thread` with a public or private key on record
    pub async fn logs(&self, thread: &ThreadId) -> Result<BTreeSet<LogId>, KeyBookError> {
        let prefix = self.thread_key(thread).descendant_prefix();
        let mut logs = BTreeSet::new();
        for key in self.store.query_keys(&prefix).await? {
            let name = key.name();
            let Some(log) = name
                .strip_suffix(PUB_SUFFIX)
                .or_else(|| name.strip_suffix(PRIV_SUFFIX))
            else {
                continue;
            };
            logs.insert(log.parse().map_err(|e| corrupt(&key, e))?);
        }
        Ok(logs)
    }

    /// Delete every entry of `thread` in a single batch
    pub async fn clear_thread_keys(&self, thread: &ThreadId) -> Result<(), KeyBookError> {
        let prefix = self.thread_key(thread).descendant_prefix();
        self.clear_prefix(&prefix).await
    }

    /// Delete both keys of `log` in a single batch
    pub async fn clear_log_keys(&self, thread: &ThreadId, log: &LogId) -> Result<(), KeyBookError> {
        let prefix = format!("{}/{}:", self.thread_key(thread), log);
        self.clear_prefix(&prefix).await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), KeyBookError> {
        let mut batch = Batch::new();
        for key in self.store.query_keys(prefix).await? {
            batch.delete(key);
        }
        if batch.is_empty() {
            return Ok(());
        }
        tracing::debug!("clearing {} keybook entries under {}", batch.len(), prefix);
        self.store.commit(batch).await?;
        Ok(())
    }

    /// Release the datastore; idempotent
    pub async fn close(&self) -> Result<(), KeyBookError> {
        self.store.close().await?;
        Ok(())
    }
}

fn corrupt(key: &Key, reason: impl std::fmt::Display) -> KeyBookError {
    KeyBookError::Corrupt {
        key: key.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{MemoryDatastore, SqliteDatastore};
    use crate::thread::Variant;

    fn thread() -> ThreadId {
        ThreadId::random(Variant::Raw, 32)
    }

    fn book() -> KeyBook<MemoryDatastore> {
        KeyBook::new(MemoryDatastore::new())
    }

    #[tokio::test]
    async fn test_pub_key_derivation_check() {
        let book = book();
        let t = thread();
        let owner = SecretKey::generate();
        let log = LogId::from_secret_key(&owner);
        let other = SecretKey::generate();

        assert!(matches!(
            book.add_pub_key(&t, &log, &other.public()).await,
            Err(KeyBookError::KeyMismatch(_))
        ));
        assert!(book.pub_key(&t, &log).await.unwrap().is_none());

        book.add_pub_key(&t, &log, &owner.public()).await.unwrap();
        assert_eq!(book.pub_key(&t, &log).await.unwrap(), Some(owner.public()));
    }

    #[tokio::test]
    async fn test_priv_key_derivation_check() {
        let book = book();
        let t = thread();
        let owner = SecretKey::generate();
        let log = LogId::from_secret_key(&owner);

        assert!(matches!(
            book.add_priv_key(&t, &log, &SecretKey::generate()).await,
            Err(KeyBookError::KeyMismatch(_))
        ));
        assert!(book.priv_key(&t, &log).await.unwrap().is_none());
        assert!(book.logs(&t).await.unwrap().is_empty());

        book.add_priv_key(&t, &log, &owner).await.unwrap();
        assert_eq!(book.priv_key(&t, &log).await.unwrap(), Some(owner));
        assert_eq!(book.logs(&t).await.unwrap(), BTreeSet::from([log]));
    }

    #[tokio::test]
    async fn test_thread_keys_round_trip() {
        let book = book();
        let t = thread();
        assert!(book.read_key(&t).await.unwrap().is_none());
        assert!(book.thread_keys(&t).await.unwrap().is_none());

        let read = Secret::generate();
        let service = Secret::generate();
        book.add_read_key(&t, &read).await.unwrap();
        book.add_service_key(&t, &service).await.unwrap();
        assert_eq!(book.read_key(&t).await.unwrap(), Some(read.clone()));
        assert_eq!(book.service_key(&t).await.unwrap(), Some(service.clone()));

        // overwrite is unconditional
        let newer = Secret::generate();
        book.add_read_key(&t, &newer).await.unwrap();
        assert_eq!(book.read_key(&t).await.unwrap(), Some(newer.clone()));

        let keys = book.thread_keys(&t).await.unwrap().unwrap();
        assert_eq!(keys, ThreadKey::new(service, Some(newer)));
    }

    #[tokio::test]
    async fn test_threads_requires_service_key() {
        let book = book();
        let readable = thread();
        let replicated = thread();
        let both = thread();

        book.add_read_key(&readable, &Secret::generate()).await.unwrap();
        book.add_service_key(&replicated, &Secret::generate())
            .await
            .unwrap();
        book.add_thread_keys(&both, &ThreadKey::generate(true))
            .await
            .unwrap();

        let threads = book.threads().await.unwrap();
        assert_eq!(threads, BTreeSet::from([replicated, both]));
    }

    #[tokio::test]
    async fn test_clear_thread_keys_leaves_siblings() {
        let book = book();
        let t = thread();
        let sibling = thread();

        for id in [&t, &sibling] {
            let owner = SecretKey::generate();
            let log = LogId::from_secret_key(&owner);
            book.add_thread_keys(id, &ThreadKey::generate(true))
                .await
                .unwrap();
            book.add_pub_key(id, &log, &owner.public()).await.unwrap();
            book.add_priv_key(id, &log, &owner).await.unwrap();
        }

        book.clear_thread_keys(&t).await.unwrap();
        assert!(book.logs(&t).await.unwrap().is_empty());
        assert!(book.service_key(&t).await.unwrap().is_none());
        assert_eq!(book.logs(&sibling).await.unwrap().len(), 1);
        assert!(book.thread_keys(&sibling).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_log_keys() {
        let book = book();
        let t = thread();
        let mine = SecretKey::generate();
        let theirs = SecretKey::generate();
        let mine_id = LogId::from_secret_key(&mine);
        let theirs_id = LogId::from_secret_key(&theirs);

        book.add_priv_key(&t, &mine_id, &mine).await.unwrap();
        book.add_pub_key(&t, &mine_id, &mine.public()).await.unwrap();
        book.add_pub_key(&t, &theirs_id, &theirs.public())
            .await
            .unwrap();
        book.add_service_key(&t, &Secret::generate()).await.unwrap();

        book.clear_log_keys(&t, &mine_id).await.unwrap();
        assert_eq!(book.logs(&t).await.unwrap(), BTreeSet::from([theirs_id]));
        assert!(book.service_key(&t).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sqlite_keybook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.sqlite");
        let t = thread();
        let owner = SecretKey::generate();
        let log = LogId::from_secret_key(&owner);

        let book = KeyBook::new(SqliteDatastore::open(&path).await.unwrap());
        book.add_thread_keys(&t, &ThreadKey::generate(false))
            .await
            .unwrap();
        book.add_priv_key(&t, &log, &owner).await.unwrap();
        book.close().await.unwrap();
        book.close().await.unwrap();

        let book = KeyBook::new(SqliteDatastore::open(&path).await.unwrap());
        assert_eq!(book.threads().await.unwrap(), BTreeSet::from([t.clone()]));
        assert!(book.read_key(&t).await.unwrap().is_none());
        assert_eq!(book.priv_key(&t, &log).await.unwrap(), Some(owner));
    }
}
