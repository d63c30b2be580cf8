use std::sync::Arc;

use async_trait::async_trait;

use common::crypto::SecretKey;
use common::datastore::Datastore;
use common::identity::Identity;
use common::keybook::KeyBook;
use common::linked_data::{Block, Cid};
use common::record::{Event, Record, ThreadRecord};
use common::thread::{Addr, LogId, PeerId, ThreadId, ThreadInfo, ThreadKey, ThreadToken};

use crate::client::Client;
use crate::context::Context;
use crate::error::Error;
use crate::options::{LogKey, NewThreadOptions};
use crate::subscription::{KeyResolver, Subscription};

/// A [`Client`] that keeps Thread and Log keys in a local [`KeyBook`]
///
/// Read keys and Log private keys never leave this peer: the host only
/// receives service keys and Log public keys, and records are built and
/// signed locally.
#[derive(Debug, Clone)]
pub struct Network<D: Datastore> {
    client: Client,
    keys: KeyBook<D>,
}

impl<D: Datastore> Network<D> {
    pub fn new(client: Client, keys: KeyBook<D>) -> Self {
        Self { client, keys }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn keys(&self) -> &KeyBook<D> {
        &self.keys
    }

    pub async fn get_token(
        &self,
        identity: &dyn Identity,
        ctx: Option<&Context>,
    ) -> Result<ThreadToken, Error> {
        self.client.get_token(identity, ctx).await
    }

    pub async fn get_host_id(&self, ctx: Option<&Context>) -> Result<PeerId, Error> {
        self.client.get_host_id(ctx).await
    }

    /// Fill in missing keys locally, create the Thread remotely with only
    /// the shareable halves, then persist the full keys
    pub async fn create_thread(
        &self,
        id: &ThreadId,
        opts: NewThreadOptions,
        ctx: Option<&Context>,
    ) -> Result<ThreadInfo, Error> {
        let thread_key = opts
            .thread_key
            .clone()
            .unwrap_or_else(|| ThreadKey::generate(true));
        let log_key = opts
            .log_key
            .clone()
            .unwrap_or_else(|| LogKey::Private(SecretKey::generate()));

        let remote = NewThreadOptions {
            thread_key: Some(thread_key.service_only()),
            log_key: Some(LogKey::Public(log_key.public())),
            token: opts.token,
        };
        let info = self.client.create_thread(id, remote, ctx).await?;

        self.store_keys(id, &thread_key, &log_key).await?;
        tracing::info!("created thread {} with log {}", id, log_key.log_id());
        self.merge_local(info).await
    }

    /// Join the Thread at `addr`; `opts.thread_key` is required
    pub async fn add_thread(
        &self,
        addr: &Addr,
        opts: NewThreadOptions,
        ctx: Option<&Context>,
    ) -> Result<ThreadInfo, Error> {
        let id: ThreadId = addr
            .value_for("thread")
            .ok_or_else(|| Error::Decode(format!("{} has no thread component", addr)))?
            .parse()?;
        let thread_key = opts
            .thread_key
            .clone()
            .ok_or_else(|| Error::MissingKey(id.clone()))?;
        let log_key = opts
            .log_key
            .clone()
            .unwrap_or_else(|| LogKey::Private(SecretKey::generate()));

        let remote = NewThreadOptions {
            thread_key: Some(thread_key.service_only()),
            log_key: Some(LogKey::Public(log_key.public())),
            token: opts.token,
        };
        let info = self.client.add_thread(addr, remote, ctx).await?;
        if info.id != id {
            return Err(Error::Decode(format!(
                "joined {} but host returned {}",
                id, info.id
            )));
        }

        self.store_keys(&id, &thread_key, &log_key).await?;
        tracing::info!("joined thread {}", id);
        self.merge_local(info).await
    }

    async fn store_keys(
        &self,
        id: &ThreadId,
        thread_key: &ThreadKey,
        log_key: &LogKey,
    ) -> Result<(), Error> {
        self.keys.add_thread_keys(id, thread_key).await?;
        let log_id = log_key.log_id();
        self.keys.add_pub_key(id, &log_id, &log_key.public()).await?;
        if let Some(priv_key) = log_key.private() {
            self.keys.add_priv_key(id, &log_id, priv_key).await?;
        }
        Ok(())
    }

    /// Remote snapshot completed with keys only held here
    async fn merge_local(&self, mut info: ThreadInfo) -> Result<ThreadInfo, Error> {
        if let Some(local) = self.keys.thread_keys(&info.id).await? {
            let read = local
                .read()
                .or_else(|| info.key.as_ref().and_then(ThreadKey::read))
                .cloned();
            info.key = Some(ThreadKey::new(local.service().clone(), read));
        }
        for log in info.logs.values_mut() {
            if log.priv_key.is_none() {
                log.priv_key = self.keys.priv_key(&info.id, &log.id).await?;
            }
        }
        Ok(info)
    }

    pub async fn get_thread(
        &self,
        id: &ThreadId,
        ctx: Option<&Context>,
    ) -> Result<ThreadInfo, Error> {
        let info = self.client.get_thread(id, ctx).await?;
        self.merge_local(info).await
    }

    pub async fn pull_thread(&self, id: &ThreadId, ctx: Option<&Context>) -> Result<(), Error> {
        self.client.pull_thread(id, ctx).await
    }

    /// Delete remotely, then drop every local key of the Thread
    pub async fn delete_thread(&self, id: &ThreadId, ctx: Option<&Context>) -> Result<(), Error> {
        self.client.delete_thread(id, ctx).await?;
        self.keys.clear_thread_keys(id).await?;
        tracing::info!("deleted thread {}", id);
        Ok(())
    }

    pub async fn add_replicator(
        &self,
        id: &ThreadId,
        addr: &Addr,
        ctx: Option<&Context>,
    ) -> Result<PeerId, Error> {
        self.client.add_replicator(id, addr, ctx).await
    }

    /// Build, encrypt and sign a record locally and append it to our Log
    pub async fn create_record(
        &self,
        id: &ThreadId,
        body: &Block,
        ctx: Option<&Context>,
    ) -> Result<ThreadRecord, Error> {
        let missing = || Error::MissingKey(id.clone());
        let thread_key = self.keys.thread_keys(id).await?.ok_or_else(missing)?;
        let read_key = thread_key.read().ok_or_else(missing)?;
        let (log_id, log_key) = self.owned_log(id).await?.ok_or_else(missing)?;

        let info = self.client.get_thread(id, ctx).await?;
        let head = info.log(&log_id).and_then(|log| log.head);

        let event = Event::create(body, read_key)?;
        let record = Record::create(event, &log_key, head, thread_key.service())?;
        self.client.add_record(id, &log_id, &record, ctx).await?;
        tracing::debug!("appended {} to {} / {}", record.cid(), id, log_id);

        Ok(ThreadRecord::new(record, id.clone()))
    }

    async fn owned_log(&self, id: &ThreadId) -> Result<Option<(LogId, SecretKey)>, Error> {
        for log in self.keys.logs(id).await? {
            if let Some(key) = self.keys.priv_key(id, &log).await? {
                return Ok(Some((log, key)));
            }
        }
        Ok(None)
    }

    pub async fn add_record(
        &self,
        id: &ThreadId,
        log: &LogId,
        record: &Record,
        ctx: Option<&Context>,
    ) -> Result<(), Error> {
        self.client.add_record(id, log, record, ctx).await
    }

    /// Fetch a record, decoding it with the local service key when held
    pub async fn get_record(
        &self,
        id: &ThreadId,
        cid: &Cid,
        ctx: Option<&Context>,
    ) -> Result<Record, Error> {
        let key = match self.keys.thread_keys(id).await? {
            Some(key) => key,
            None => self
                .client
                .get_thread(id, ctx)
                .await?
                .key
                .ok_or_else(|| Error::MissingKey(id.clone()))?,
        };
        self.client.get_record_with_key(id, cid, &key, ctx).await
    }

    /// Subscribe, resolving Thread keys from the KeyBook first
    pub async fn subscribe(
        &self,
        threads: &[ThreadId],
        ctx: Option<&Context>,
    ) -> Result<Subscription, Error> {
        let resolver = LocalKeys {
            network: self.clone(),
            ctx: ctx.cloned(),
        };
        self.client
            .subscribe_with(threads, Arc::new(resolver), ctx)
            .await
    }

    /// Close the KeyBook
    pub async fn close(&self) -> Result<(), Error> {
        self.keys.close().await?;
        Ok(())
    }
}

struct LocalKeys<D: Datastore> {
    network: Network<D>,
    ctx: Option<Context>,
}

#[async_trait]
impl<D: Datastore> KeyResolver for LocalKeys<D> {
    async fn resolve(&self, thread: &ThreadId) -> Result<Option<ThreadKey>, Error> {
        if let Some(key) = self.network.keys.thread_keys(thread).await? {
            return Ok(Some(key));
        }
        match self.network.client.get_thread(thread, self.ctx.as_ref()).await {
            Ok(info) => Ok(info.key),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
