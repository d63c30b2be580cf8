use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use common::linked_data::multibase::{self, Base};
use parking_lot::Mutex;
use url::Url;

use common::crypto::{PublicKey, Secret, Signature};
use common::linked_data::Cid;
use common::thread::{Addr, PeerId, ThreadId, ThreadInfo};

use crate::client::Client;
use crate::context::Context;
use crate::messages::{self, GetHostIdRequest, GetTokenReply, GetTokenRequest, Request};
use crate::transport::{CallError, Code, Duplex, Frame, FrameStream, Status, Transport};

use super::host::{host_addr, thread_addr, HostState, NetworkState, PROTOCOL};

/// A set of in-process hosts reachable at `memory://<name>`
///
/// Every [`Client`] built from the same network talks to the same hosts.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryNetwork")
            .field("hosts", &state.hosts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a host named `name`
    pub fn add_host(&self, name: &str) -> Result<MemoryHost> {
        let mut state = self.state.lock();
        if state.hosts.contains_key(name) {
            return Err(anyhow!("host '{}' already exists", name));
        }
        state.hosts.insert(name.to_string(), HostState::new(name));
        tracing::debug!("started memory host {}", name);
        Ok(MemoryHost {
            name: name.to_string(),
            network: self.clone(),
        })
    }

    /// Handle on an existing host
    pub fn host(&self, name: &str) -> Result<MemoryHost> {
        if !self.state.lock().hosts.contains_key(name) {
            return Err(anyhow!("no host '{}'", name));
        }
        Ok(MemoryHost {
            name: name.to_string(),
            network: self.clone(),
        })
    }

    /// A client whose default context points at `host`
    pub fn client(&self, host: &MemoryHost) -> Client {
        Client::new(Arc::new(self.clone()), host.context())
    }

    /// Resolve the host a call is addressed to and count the call
    fn route(&self, ctx: &Context, method: &str) -> Result<String, CallError> {
        let url = ctx
            .host
            .as_ref()
            .ok_or_else(|| CallError::Transport("no host in context".into()))?;
        let name = match (url.scheme(), url.host_str()) {
            (PROTOCOL, Some(name)) => name.to_string(),
            _ => return Err(CallError::Transport(format!("cannot route to {}", url))),
        };

        let mut state = self.state.lock();
        let host = state
            .hosts
            .get_mut(&name)
            .ok_or_else(|| CallError::Transport(format!("connection refused: {}", url)))?;
        *host.calls.entry(method.to_string()).or_default() += 1;
        Ok(name)
    }

    fn authorize(&self, host: &str, ctx: &Context) -> Result<(), CallError> {
        let state = self.state.lock();
        let host = state.host(host).map_err(CallError::Status)?;
        if !host.require_token {
            return Ok(());
        }
        match Context::bearer(&ctx.metadata()) {
            Some(token) if host.tokens.contains(token.as_str()) => Ok(()),
            Some(_) => Err(CallError::Status(Status::new(
                Code::Unauthenticated,
                "unknown token",
            ))),
            None => Err(CallError::Status(Status::new(
                Code::Unauthenticated,
                "missing token",
            ))),
        }
    }

    /// Server half of the token handshake
    async fn serve_token(self, host: String, incoming: flume::Receiver<Bytes>, out: flume::Sender<Frame>) {
        let status = match self.token_exchange(&host, &incoming, &out).await {
            Ok(()) => Status::ok(),
            Err(status) => {
                tracing::debug!("{} refused a token: {}", host, status);
                status
            }
        };
        let _ = out.send(Frame::End(status));
    }

    async fn token_exchange(
        &self,
        host: &str,
        incoming: &flume::Receiver<Bytes>,
        out: &flume::Sender<Frame>,
    ) -> Result<(), Status> {
        let public_key = match receive(incoming).await? {
            GetTokenRequest::Key(bytes) => PublicKey::unmarshal(&bytes)
                .map_err(|e| Status::new(Code::InvalidArgument, e.to_string()))?,
            GetTokenRequest::Signature(_) => {
                return Err(Status::new(Code::InvalidArgument, "expected a public key"))
            }
        };

        let challenge = Secret::generate().bytes().to_vec();
        send(out, &GetTokenReply::Challenge(challenge.clone()))?;

        let signature = match receive(incoming).await? {
            GetTokenRequest::Signature(bytes) => Signature::from_slice(&bytes)
                .map_err(|_| Status::new(Code::Unauthenticated, "malformed signature"))?,
            GetTokenRequest::Key(_) => {
                return Err(Status::new(Code::InvalidArgument, "expected a signature"))
            }
        };
        public_key
            .verify(&challenge, &signature)
            .map_err(|_| Status::new(Code::Unauthenticated, "bad signature"))?;

        let token = multibase::encode(Base::Base32Lower, Secret::generate().bytes());
        self.state
            .lock()
            .host_mut(host)?
            .tokens
            .insert(token.clone());
        tracing::debug!("{} issued a token to {}", host, public_key);
        send(out, &GetTokenReply::Token(token))
    }
}

async fn receive(incoming: &flume::Receiver<Bytes>) -> Result<GetTokenRequest, Status> {
    let bytes = incoming
        .recv_async()
        .await
        .map_err(|_| Status::new(Code::Cancelled, "client closed the stream"))?;
    messages::decode(&bytes).map_err(|e| Status::new(Code::InvalidArgument, e.to_string()))
}

fn send(out: &flume::Sender<Frame>, reply: &GetTokenReply) -> Result<(), Status> {
    let bytes = messages::encode(reply).map_err(|e| Status::new(Code::Internal, e.to_string()))?;
    out.send(Frame::Message(bytes))
        .map_err(|_| Status::new(Code::Cancelled, "client went away"))
}

#[async_trait]
impl Transport for MemoryNetwork {
    async fn unary(&self, ctx: &Context, method: &str, payload: Bytes) -> Result<Bytes, CallError> {
        let host = self.route(ctx, method)?;
        if method != GetHostIdRequest::METHOD {
            self.authorize(&host, ctx)?;
        }
        self.state
            .lock()
            .dispatch(&host, method, &payload)
            .map_err(CallError::Status)
    }

    async fn server_stream(
        &self,
        ctx: &Context,
        method: &str,
        payload: Bytes,
    ) -> Result<FrameStream, CallError> {
        let host = self.route(ctx, method)?;
        if method != messages::SUBSCRIBE {
            return Err(CallError::Status(Status::new(
                Code::Unimplemented,
                format!("{} is not a server stream", method),
            )));
        }
        self.authorize(&host, ctx)?;
        self.state
            .lock()
            .subscribe(&host, &payload)
            .map_err(CallError::Status)
    }

    async fn duplex(&self, ctx: &Context, method: &str) -> Result<Duplex, CallError> {
        let host = self.route(ctx, method)?;
        if method != messages::GET_TOKEN {
            return Err(CallError::Status(Status::new(
                Code::Unimplemented,
                format!("{} is not a duplex stream", method),
            )));
        }
        let (sender, incoming) = flume::unbounded();
        let (out, frames) = flume::unbounded();
        tokio::spawn(self.clone().serve_token(host, incoming, out));
        Ok(Duplex { sender, frames })
    }
}

/// Handle on one host of a [`MemoryNetwork`]
#[derive(Debug, Clone)]
pub struct MemoryHost {
    name: String,
    network: MemoryNetwork,
}

impl MemoryHost {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("{}://{}", PROTOCOL, self.name))
            .expect("host names are valid url hosts")
    }

    /// Context addressing this host
    pub fn context(&self) -> Context {
        Context::new().with_host(self.url())
    }

    /// Address other hosts use to reach this one
    pub fn addr(&self) -> Addr {
        host_addr(&self.name)
    }

    /// Address of Thread `id` on this host
    pub fn thread_addr(&self, id: &ThreadId) -> Addr {
        thread_addr(&self.name, id)
    }

    pub fn peer_id(&self) -> PeerId {
        self.with(|host| host.peer_id())
    }

    /// Reject calls without a token issued by this host
    pub fn require_token(&self, required: bool) {
        self.with(|host| host.require_token = required)
    }

    /// Whether appended records are pushed to peers; when off, peers only
    /// see them by pulling
    pub fn push_records(&self, push: bool) {
        self.with(|host| host.push = push)
    }

    /// How many times `method` was called on this host
    pub fn calls(&self, method: &str) -> usize {
        self.with(|host| host.calls.get(method).copied().unwrap_or(0))
    }

    /// The host's own view of Thread `id`, private keys included
    pub fn thread(&self, id: &ThreadId) -> Option<ThreadInfo> {
        self.with(|host| host.threads.get(id).map(|thread| thread.info.clone()))
    }

    pub fn has_record(&self, id: &ThreadId, cid: &Cid) -> bool {
        self.with(|host| {
            host.threads
                .get(id)
                .is_some_and(|thread| thread.has_record(cid))
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.with(|host| {
            host.subscribers.retain(|sub| !sub.is_disconnected());
            host.subscribers.len()
        })
    }

    /// End every open subscription with `status`
    pub fn end_subscriptions(&self, status: Status) {
        self.with(|host| host.end_subscriptions(Frame::End(status)))
    }

    /// Drop every open subscription as if the connection failed
    pub fn break_subscriptions(&self, reason: &str) {
        self.with(|host| host.end_subscriptions(Frame::Broken(reason.to_string())))
    }

    /// Send raw bytes as a message to every subscriber
    pub fn push_raw(&self, payload: Bytes) {
        self.with(|host| host.broadcast(Frame::Message(payload)))
    }

    fn with<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut state = self.network.state.lock();
        let host = state
            .hosts
            .get_mut(&self.name)
            .expect("hosts are never removed from a network");
        f(host)
    }
}
