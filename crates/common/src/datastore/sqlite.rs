use std::path::Path;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};

use super::{Batch, BatchOp, Datastore, DatastoreError, Key};

/// SQLite-backed datastore, one `(key, value)` table
#[derive(Debug, Clone)]
pub struct SqliteDatastore {
    pool: SqlitePool,
}

impl SqliteDatastore {
    /// Open (creating if missing) a datastore file
    pub async fn open(path: &Path) -> Result<Self, DatastoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// A private in-memory database
    pub async fn in_memory() -> Result<Self, DatastoreError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        // every connection would get its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), DatastoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn pool(&self) -> Result<&SqlitePool, DatastoreError> {
        if self.pool.is_closed() {
            return Err(DatastoreError::Closed);
        }
        Ok(&self.pool)
    }
}

#[async_trait]
impl Datastore for SqliteDatastore {
    async fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, DatastoreError> {
        let row = sqlx::query("SELECT value FROM datastore WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row.map(|row| row.get::<Vec<u8>, _>("value")))
    }

    async fn put(&self, key: &Key, value: Vec<u8>) -> Result<(), DatastoreError> {
        sqlx::query(
            r#"
            INSERT INTO datastore (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key.as_str())
        .bind(value)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    async fn has(&self, key: &Key) -> Result<bool, DatastoreError> {
        let row = sqlx::query("SELECT 1 FROM datastore WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row.is_some())
    }

    async fn delete(&self, key: &Key) -> Result<(), DatastoreError> {
        sqlx::query("DELETE FROM datastore WHERE key = ?")
            .bind(key.as_str())
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    async fn query_keys(&self, prefix: &str) -> Result<Vec<Key>, DatastoreError> {
        // LIKE would treat `_` and `%` in ids as wildcards
        let rows = sqlx::query(
            "SELECT key FROM datastore WHERE substr(key, 1, length(?)) = ? ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(self.pool()?)
        .await?;

        rows.iter()
            .map(|row| Key::new(row.get::<String, _>("key")))
            .collect()
    }

    async fn commit(&self, batch: Batch) -> Result<(), DatastoreError> {
        let mut tx = self.pool()?.begin().await?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    sqlx::query(
                        r#"
                        INSERT INTO datastore (key, value) VALUES (?, ?)
                        ON CONFLICT(key) DO UPDATE SET value = excluded.value
                        "#,
                    )
                    .bind(key.as_str())
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
                }
                BatchOp::Delete(key) => {
                    sqlx::query("DELETE FROM datastore WHERE key = ?")
                        .bind(key.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DatastoreError> {
        self.pool.close().await;
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
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.sqlite");

        let store = SqliteDatastore::open(&path).await.unwrap();
        store.put(&key("/thread/keys/a/read"), vec![7; 32]).await.unwrap();
        store.put(&key("/thread/keys/a/read"), vec![8; 32]).await.unwrap();
        store.close().await.unwrap();

        let store = SqliteDatastore::open(&path).await.unwrap();
        assert_eq!(
            store.get(&key("/thread/keys/a/read")).await.unwrap(),
            Some(vec![8; 32])
        );
    }

    #[tokio::test]
    async fn test_prefix_query_is_literal() {
        let store = SqliteDatastore::in_memory().await.unwrap();
        store.put(&key("/t/a_b/x"), vec![1]).await.unwrap();
        store.put(&key("/t/aXb/x"), vec![2]).await.unwrap();

        let keys = store.query_keys("/t/a_b/").await.unwrap();
        assert_eq!(keys, vec![key("/t/a_b/x")]);
    }

    #[tokio::test]
    async fn test_batch_and_close() {
        let store = SqliteDatastore::in_memory().await.unwrap();
        store.put(&key("/x"), vec![0]).await.unwrap();

        let mut batch = Batch::new();
        batch.put(key("/y"), vec![1]).delete(key("/x"));
        store.commit(batch).await.unwrap();

        assert!(!store.has(&key("/x")).await.unwrap());
        assert!(store.has(&key("/y")).await.unwrap());

        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(
            store.has(&key("/y")).await,
            Err(DatastoreError::Closed)
        ));
    }
}
