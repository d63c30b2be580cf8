use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_bytes::ByteBuf;

use common::crypto::{PublicKey, Signature};
use common::identity::{Identity, IdentityError};
use common::linked_data::{Block, Cid};
use common::record::{Record, ThreadRecord};
use common::thread::{Addr, LogId, PeerId, ThreadId, ThreadInfo, ThreadKey, ThreadToken};

use crate::context::Context;
use crate::error::Error;
use crate::messages::{
    self, AddRecordRequest, AddReplicatorRequest, AddThreadRequest, CreateRecordRequest,
    CreateThreadRequest, DeleteThreadRequest, GetHostIdRequest, GetRecordRequest,
    GetThreadRequest, GetTokenReply, GetTokenRequest, Keys, PullThreadRequest, Request,
    SubscribeRequest,
};
use crate::options::NewThreadOptions;
use crate::subscription::{KeyResolver, Subscription};
use crate::token::{Handshake, Step};
use crate::transport::{Duplex, Frame, HttpConfig, HttpTransport, Transport};

/// Client for the Threads network API
///
/// Cheap to clone; clones share the transport and the default context.
/// Calls carry an optional [`Context`] merged over the default one.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    context: Arc<RwLock<Context>>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, context: Context) -> Self {
        Self {
            transport,
            context: Arc::new(RwLock::new(context)),
        }
    }

    /// Client over [`HttpTransport`]
    pub fn http(context: Context, config: HttpConfig) -> Result<Self, Error> {
        let transport = HttpTransport::new(config).map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self::new(Arc::new(transport), context))
    }

    /// The default calling context
    pub fn context(&self) -> Context {
        self.context.read().clone()
    }

    /// Bind `token` into the default context
    pub fn set_token(&self, token: ThreadToken) {
        self.context.write().token = Some(token);
    }

    fn call_context(&self, ctx: Option<&Context>) -> Context {
        match ctx {
            Some(ctx) => self.context().merge(ctx),
            None => self.context(),
        }
    }

    async fn call<R: Request>(&self, ctx: &Context, request: &R) -> Result<R::Reply, Error> {
        tracing::debug!("calling {}", R::METHOD);
        let payload = messages::encode(request)?;
        let reply = self
            .transport
            .unary(ctx, R::METHOD, payload)
            .await
            .map_err(|e| {
                tracing::debug!("{} failed: {}", R::METHOD, e);
                Error::from(e)
            })?;
        messages::decode(&reply)
    }

    /// Obtain a token for `public_key`, signing the challenge with `sign`
    ///
    /// On success the token is also bound into the default context.
    pub async fn get_token_challenge<F, Fut>(
        &self,
        public_key: &PublicKey,
        sign: F,
        ctx: Option<&Context>,
    ) -> Result<ThreadToken, Error>
    where
        F: FnOnce(Vec<u8>) -> Fut + Send,
        Fut: Future<Output = Result<Signature, IdentityError>> + Send,
    {
        let ctx = self.call_context(ctx);
        let Duplex { sender, frames } = self.transport.duplex(&ctx, messages::GET_TOKEN).await?;

        let (mut handshake, opening) = Handshake::start(public_key);
        sender
            .send_async(messages::encode(&opening)?)
            .await
            .map_err(|_| Error::Transport("token stream closed".into()))?;

        let mut sign = Some(sign);
        loop {
            let frame = frames
                .recv_async()
                .await
                .map_err(|_| Error::Transport("token stream dropped".into()))?;
            let reply: GetTokenReply = match frame {
                Frame::Message(bytes) => messages::decode(&bytes)?,
                Frame::End(status) => return Err(handshake.on_end(status)),
                Frame::Broken(msg) => return Err(Error::Transport(msg)),
            };

            match handshake.on_reply(reply)? {
                Step::Sign(challenge) => {
                    let sign = sign
                        .take()
                        .ok_or_else(|| Error::Auth("challenge already answered".into()))?;
                    let signature = sign(challenge)
                        .await
                        .map_err(|e| Error::Auth(e.to_string()))?;
                    let answer = GetTokenRequest::Signature(signature.to_bytes().to_vec());
                    sender
                        .send_async(messages::encode(&answer)?)
                        .await
                        .map_err(|_| Error::Transport("token stream closed".into()))?;
                }
                Step::Token(token) => {
                    drop(sender);
                    tracing::info!("obtained token for {}", public_key);
                    self.set_token(token.clone());
                    return Ok(token);
                }
            }
        }
    }

    /// Obtain a token for `identity`
    pub async fn get_token(
        &self,
        identity: &dyn Identity,
        ctx: Option<&Context>,
    ) -> Result<ThreadToken, Error> {
        let public_key = identity.public();
        self.get_token_challenge(
            &public_key,
            |challenge| async move { identity.sign(&challenge).await },
            ctx,
        )
        .await
    }

    /// Peer id of the host behind the service
    pub async fn get_host_id(&self, ctx: Option<&Context>) -> Result<PeerId, Error> {
        let ctx = self.call_context(ctx);
        let reply = self.call(&ctx, &GetHostIdRequest).await?;
        Ok(PeerId::from_bytes(&reply.peer_id)?)
    }

    fn options_context(&self, opts: &NewThreadOptions, ctx: Option<&Context>) -> Context {
        let mut ctx = self.call_context(ctx);
        if let Some(token) = &opts.token {
            ctx.token = Some(token.clone());
        }
        ctx
    }

    /// Create a Thread; keys left out of `opts` are generated by the service
    pub async fn create_thread(
        &self,
        id: &ThreadId,
        opts: NewThreadOptions,
        ctx: Option<&Context>,
    ) -> Result<ThreadInfo, Error> {
        let ctx = self.options_context(&opts, ctx);
        let request = CreateThreadRequest {
            thread_id: id.to_bytes(),
            keys: Keys::new(opts.thread_key.as_ref(), opts.log_key.as_ref()),
        };
        ThreadInfo::try_from(self.call(&ctx, &request).await?)
    }

    /// Join the Thread at `addr`
    pub async fn add_thread(
        &self,
        addr: &Addr,
        opts: NewThreadOptions,
        ctx: Option<&Context>,
    ) -> Result<ThreadInfo, Error> {
        let ctx = self.options_context(&opts, ctx);
        let request = AddThreadRequest {
            addr: addr.to_bytes(),
            keys: Keys::new(opts.thread_key.as_ref(), opts.log_key.as_ref()),
        };
        ThreadInfo::try_from(self.call(&ctx, &request).await?)
    }

    /// Fails with [`Error::NotFound`] if the host does not know the Thread
    pub async fn get_thread(
        &self,
        id: &ThreadId,
        ctx: Option<&Context>,
    ) -> Result<ThreadInfo, Error> {
        let ctx = self.call_context(ctx);
        let request = GetThreadRequest {
            thread_id: id.to_bytes(),
        };
        ThreadInfo::try_from(self.call(&ctx, &request).await?)
    }

    /// Ask the host to run a replication round for the Thread
    pub async fn pull_thread(&self, id: &ThreadId, ctx: Option<&Context>) -> Result<(), Error> {
        let ctx = self.call_context(ctx);
        let request = PullThreadRequest {
            thread_id: id.to_bytes(),
        };
        self.call(&ctx, &request).await?;
        Ok(())
    }

    pub async fn delete_thread(&self, id: &ThreadId, ctx: Option<&Context>) -> Result<(), Error> {
        let ctx = self.call_context(ctx);
        let request = DeleteThreadRequest {
            thread_id: id.to_bytes(),
        };
        self.call(&ctx, &request).await?;
        Ok(())
    }

    /// Register the peer at `addr` as a replicator, returning its id
    pub async fn add_replicator(
        &self,
        id: &ThreadId,
        addr: &Addr,
        ctx: Option<&Context>,
    ) -> Result<PeerId, Error> {
        let ctx = self.call_context(ctx);
        let request = AddReplicatorRequest {
            thread_id: id.to_bytes(),
            addr: addr.to_bytes(),
        };
        let reply = self.call(&ctx, &request).await?;
        Ok(PeerId::from_bytes(&reply.peer_id)?)
    }

    /// Have the host write `body` to its Log in the Thread
    ///
    /// The returned record is decoded with the Thread key from the host's
    /// ThreadInfo. Without a key the write still happens and `record` is
    /// `None`.
    pub async fn create_record(
        &self,
        id: &ThreadId,
        body: &Block,
        ctx: Option<&Context>,
    ) -> Result<ThreadRecord, Error> {
        let ctx = self.call_context(ctx);
        let info = self.get_thread(id, Some(&ctx)).await?;

        let request = CreateRecordRequest {
            thread_id: id.to_bytes(),
            body: body.data().to_vec(),
        };
        let reply = self.call(&ctx, &request).await?;
        let log_id = LogId::from_bytes(&reply.log_id)?;

        let record = match &info.key {
            Some(key) => Some(Record::from_envelope(&reply.record, key.service())?),
            None => {
                tracing::debug!("no key for thread {}, record left encoded", id);
                None
            }
        };

        Ok(ThreadRecord {
            record,
            thread_id: id.clone(),
            log_id,
        })
    }

    /// Append a record built and signed by the caller to `log`
    pub async fn add_record(
        &self,
        id: &ThreadId,
        log: &LogId,
        record: &Record,
        ctx: Option<&Context>,
    ) -> Result<(), Error> {
        let ctx = self.call_context(ctx);
        let request = AddRecordRequest {
            thread_id: id.to_bytes(),
            log_id: log.to_bytes(),
            record: record.to_envelope(),
        };
        self.call(&ctx, &request).await?;
        Ok(())
    }

    /// Fetch a record; the Thread read key must be known to the host
    pub async fn get_record(
        &self,
        id: &ThreadId,
        cid: &Cid,
        ctx: Option<&Context>,
    ) -> Result<Record, Error> {
        let ctx = self.call_context(ctx);
        let key = self
            .get_thread(id, Some(&ctx))
            .await?
            .key
            .filter(ThreadKey::can_read)
            .ok_or_else(|| Error::MissingKey(id.clone()))?;
        self.get_record_with_key(id, cid, &key, Some(&ctx)).await
    }

    /// Fetch a record, decoding it with `key`
    pub async fn get_record_with_key(
        &self,
        id: &ThreadId,
        cid: &Cid,
        key: &ThreadKey,
        ctx: Option<&Context>,
    ) -> Result<Record, Error> {
        let ctx = self.call_context(ctx);
        let request = GetRecordRequest {
            thread_id: id.to_bytes(),
            record_id: cid.to_bytes(),
        };
        let reply = self.call(&ctx, &request).await?;
        if reply.record.is_empty() {
            return Err(Error::MissingValue(format!("record {} in thread {}", cid, id)));
        }

        let record = Record::from_envelope(&reply.record, key.service())?;
        if record.cid() != cid {
            return Err(Error::Decode(format!(
                "asked for record {}, got {}",
                cid,
                record.cid()
            )));
        }
        Ok(record)
    }

    /// Subscribe to new records of `threads`, or of every Thread if empty
    ///
    /// Thread keys are looked up on the host with `get_thread`.
    pub async fn subscribe(
        &self,
        threads: &[ThreadId],
        ctx: Option<&Context>,
    ) -> Result<Subscription, Error> {
        let resolver = RemoteKeys {
            client: self.clone(),
            ctx: self.call_context(ctx),
        };
        self.subscribe_with(threads, Arc::new(resolver), ctx).await
    }

    /// Subscribe with a custom source of Thread keys
    pub async fn subscribe_with(
        &self,
        threads: &[ThreadId],
        resolver: Arc<dyn KeyResolver>,
        ctx: Option<&Context>,
    ) -> Result<Subscription, Error> {
        let ctx = self.call_context(ctx);
        let request = SubscribeRequest {
            thread_ids: threads
                .iter()
                .map(|id| ByteBuf::from(id.to_bytes()))
                .collect(),
        };
        tracing::debug!("subscribing to {} threads", threads.len());
        let frames = self
            .transport
            .server_stream(&ctx, messages::SUBSCRIBE, messages::encode(&request)?)
            .await?;
        Ok(Subscription::spawn(frames, resolver))
    }
}

/// Resolves Thread keys from the host's ThreadInfo
#[derive(Debug)]
struct RemoteKeys {
    client: Client,
    ctx: Context,
}

#[async_trait]
impl KeyResolver for RemoteKeys {
    async fn resolve(&self, thread: &ThreadId) -> Result<Option<ThreadKey>, Error> {
        match self.client.get_thread(thread, Some(&self.ctx)).await {
            Ok(info) => Ok(info.key),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
