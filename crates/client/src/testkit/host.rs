//! Host-side state and request handling of the in-process network

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use bytes::Bytes;

use common::crypto::SecretKey;
use common::linked_data::{Block, Cid};
use common::record::{Event, Record, RecordEnvelope};
use common::thread::{Addr, LogId, LogInfo, PeerId, ThreadId, ThreadInfo, ThreadKey};

use crate::messages::{
    self, AddRecordRequest, AddReplicatorReply, AddReplicatorRequest, AddThreadRequest,
    CreateRecordRequest, CreateThreadRequest, DeleteThreadRequest, Empty, GetHostIdReply,
    GetHostIdRequest, GetRecordReply, GetRecordRequest, GetThreadRequest, Keys, NewRecordReply,
    PullThreadRequest, Request, SubscribeRequest, ThreadInfoReply,
};
use crate::options::LogKey;
use crate::transport::{Code, Frame, Status};

/// Address protocol naming an in-process host
pub const PROTOCOL: &str = "memory";

pub(crate) fn host_addr(name: &str) -> Addr {
    memory_addr(format!("/{}/{}", PROTOCOL, name))
}

pub(crate) fn thread_addr(name: &str, id: &ThreadId) -> Addr {
    memory_addr(format!("/{}/{}/thread/{}", PROTOCOL, name, id))
}

fn memory_addr(text: String) -> Addr {
    Addr::new(text).expect("memory addresses start with a protocol")
}

fn invalid(err: impl Display) -> Status {
    Status::new(Code::InvalidArgument, err.to_string())
}

fn not_found(id: &ThreadId) -> Status {
    Status::new(Code::NotFound, format!("thread {} not found", id))
}

/// A client listening for new records
pub(crate) struct Subscriber {
    /// Empty means every Thread
    threads: BTreeSet<ThreadId>,
    sender: flume::Sender<Frame>,
}

impl Subscriber {
    fn wants(&self, id: &ThreadId) -> bool {
        self.threads.is_empty() || self.threads.contains(id)
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.sender.is_disconnected()
    }
}

/// One Thread as stored by a host
#[derive(Debug, Clone)]
pub(crate) struct HostThread {
    pub(crate) info: ThreadInfo,
    records: BTreeMap<Cid, Record>,
    /// Record ids per Log, oldest first
    order: BTreeMap<LogId, Vec<Cid>>,
    /// Hosts replicating this Thread
    peers: BTreeSet<String>,
}

impl HostThread {
    fn new(info: ThreadInfo) -> Self {
        Self {
            info,
            records: BTreeMap::new(),
            order: BTreeMap::new(),
            peers: BTreeSet::new(),
        }
    }

    /// Copy of this Thread for another host: no private Log keys, and the
    /// Thread key replaced by `key`
    fn replica(&self, key: ThreadKey) -> Self {
        let mut info = ThreadInfo::new(self.info.id.clone(), Some(key));
        info.addrs = self.info.addrs.clone();
        for log in self.info.logs.values() {
            let mut log = log.clone();
            log.priv_key = None;
            info.insert_log(log);
        }
        Self {
            info,
            records: self.records.clone(),
            order: self.order.clone(),
            peers: BTreeSet::new(),
        }
    }

    fn append(&mut self, record: Record) -> Result<(), Status> {
        let log_id = record.log_id();
        let log = self
            .info
            .logs
            .entry(log_id.clone())
            .or_insert_with(|| LogInfo::new(*record.pub_key()));
        record
            .verify_chain(log)
            .map_err(|e| Status::new(Code::FailedPrecondition, e.to_string()))?;
        log.head = Some(*record.cid());
        self.order.entry(log_id).or_default().push(*record.cid());
        self.records.insert(*record.cid(), record);
        Ok(())
    }

    fn records(&self) -> Vec<Record> {
        self.order
            .values()
            .flatten()
            .filter_map(|cid| self.records.get(cid).cloned())
            .collect()
    }

    pub(crate) fn has_record(&self, cid: &Cid) -> bool {
        self.records.contains_key(cid)
    }
}

/// Everything one in-process host knows
pub(crate) struct HostState {
    pub(crate) name: String,
    pub(crate) key: SecretKey,
    pub(crate) require_token: bool,
    /// Push appended records to peers right away
    pub(crate) push: bool,
    pub(crate) tokens: BTreeSet<String>,
    pub(crate) threads: BTreeMap<ThreadId, HostThread>,
    pub(crate) calls: BTreeMap<String, usize>,
    pub(crate) subscribers: Vec<Subscriber>,
}

impl HostState {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key: SecretKey::generate(),
            require_token: false,
            push: true,
            tokens: BTreeSet::new(),
            threads: BTreeMap::new(),
            calls: BTreeMap::new(),
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn peer_id(&self) -> PeerId {
        PeerId::from_secret_key(&self.key)
    }

    fn thread(&self, id: &ThreadId) -> Result<&HostThread, Status> {
        self.threads.get(id).ok_or_else(|| not_found(id))
    }

    fn thread_mut(&mut self, id: &ThreadId) -> Result<&mut HostThread, Status> {
        self.threads.get_mut(id).ok_or_else(|| not_found(id))
    }

    /// A fresh Thread with one Log for this host
    fn open_thread(&self, id: &ThreadId, key: ThreadKey, log_key: Option<LogKey>) -> HostThread {
        let mut info = ThreadInfo::new(id.clone(), Some(key));
        info.addrs.insert(thread_addr(&self.name, id));
        let mut thread = HostThread::new(info);
        thread.info.insert_log(self.log_for(log_key));
        thread
    }

    fn log_for(&self, log_key: Option<LogKey>) -> LogInfo {
        let mut log = match log_key {
            Some(LogKey::Public(key)) => LogInfo::new(key),
            Some(LogKey::Private(key)) => LogInfo::owned(key),
            None => LogInfo::owned(SecretKey::generate()),
        };
        log.addrs.insert(host_addr(&self.name));
        log
    }

    pub(crate) fn subscribe(&mut self, threads: BTreeSet<ThreadId>) -> flume::Receiver<Frame> {
        let (sender, frames) = flume::unbounded();
        self.subscribers.push(Subscriber { threads, sender });
        frames
    }

    /// Push a new record of `id` to interested subscribers, dropping gone ones
    fn notify(&mut self, id: &ThreadId, record: &Record) {
        let reply = NewRecordReply {
            thread_id: id.to_bytes(),
            log_id: record.log_id().to_bytes(),
            record: record.to_envelope(),
        };
        let bytes = match messages::encode(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("failed to encode notification: {}", e);
                return;
            }
        };
        self.subscribers.retain(|sub| {
            !sub.wants(id) || sub.sender.send(Frame::Message(bytes.clone())).is_ok()
        });
    }

    /// Send `frame` to every subscriber
    pub(crate) fn broadcast(&mut self, frame: Frame) {
        self.subscribers
            .retain(|sub| sub.sender.send(frame.clone()).is_ok());
    }

    /// End every subscription with `frame`
    pub(crate) fn end_subscriptions(&mut self, frame: Frame) {
        for sub in self.subscribers.drain(..) {
            let _ = sub.sender.send(frame.clone());
        }
    }
}

/// All hosts of one in-process network
#[derive(Default)]
pub(crate) struct NetworkState {
    pub(crate) hosts: BTreeMap<String, HostState>,
}

fn serve<R: Request>(
    payload: &[u8],
    handle: impl FnOnce(R) -> Result<R::Reply, Status>,
) -> Result<Bytes, Status> {
    let request: R = messages::decode(payload).map_err(invalid)?;
    let reply = handle(request)?;
    messages::encode(&reply).map_err(|e| Status::new(Code::Internal, e.to_string()))
}

fn thread_id(bytes: &[u8]) -> Result<ThreadId, Status> {
    ThreadId::from_bytes(bytes).map_err(invalid)
}

fn keys(keys: &Keys) -> Result<(Option<ThreadKey>, Option<LogKey>), Status> {
    Ok((
        keys.thread_key().map_err(invalid)?,
        keys.log_key().map_err(invalid)?,
    ))
}

impl NetworkState {
    pub(crate) fn host(&self, name: &str) -> Result<&HostState, Status> {
        self.hosts
            .get(name)
            .ok_or_else(|| Status::new(Code::NotFound, format!("no host {}", name)))
    }

    pub(crate) fn host_mut(&mut self, name: &str) -> Result<&mut HostState, Status> {
        self.hosts
            .get_mut(name)
            .ok_or_else(|| Status::new(Code::NotFound, format!("no host {}", name)))
    }

    /// Route one unary call to its handler
    pub(crate) fn dispatch(&mut self, host: &str, method: &str, payload: &[u8]) -> Result<Bytes, Status> {
        match method {
            m if m == GetHostIdRequest::METHOD => {
                serve::<GetHostIdRequest>(payload, |_| self.get_host_id(host))
            }
            m if m == CreateThreadRequest::METHOD => {
                serve::<CreateThreadRequest>(payload, |req| self.create_thread(host, req))
            }
            m if m == AddThreadRequest::METHOD => {
                serve::<AddThreadRequest>(payload, |req| self.add_thread(host, req))
            }
            m if m == GetThreadRequest::METHOD => {
                serve::<GetThreadRequest>(payload, |req| self.get_thread(host, req))
            }
            m if m == PullThreadRequest::METHOD => {
                serve::<PullThreadRequest>(payload, |req| self.pull_thread(host, req))
            }
            m if m == DeleteThreadRequest::METHOD => {
                serve::<DeleteThreadRequest>(payload, |req| self.delete_thread(host, req))
            }
            m if m == AddReplicatorRequest::METHOD => {
                serve::<AddReplicatorRequest>(payload, |req| self.add_replicator(host, req))
            }
            m if m == CreateRecordRequest::METHOD => {
                serve::<CreateRecordRequest>(payload, |req| self.create_record(host, req))
            }
            m if m == AddRecordRequest::METHOD => {
                serve::<AddRecordRequest>(payload, |req| self.add_record(host, req))
            }
            m if m == GetRecordRequest::METHOD => {
                serve::<GetRecordRequest>(payload, |req| self.get_record(host, req))
            }
            other => Err(Status::new(
                Code::Unimplemented,
                format!("unknown method {}", other),
            )),
        }
    }

    pub(crate) fn subscribe(&mut self, host: &str, payload: &[u8]) -> Result<flume::Receiver<Frame>, Status> {
        let request: SubscribeRequest = messages::decode(payload).map_err(invalid)?;
        let threads = request
            .thread_ids
            .iter()
            .map(|id| thread_id(id))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(self.host_mut(host)?.subscribe(threads))
    }

    fn get_host_id(&self, host: &str) -> Result<GetHostIdReply, Status> {
        Ok(GetHostIdReply {
            peer_id: self.host(host)?.peer_id().to_bytes(),
        })
    }

    fn create_thread(&mut self, host: &str, req: CreateThreadRequest) -> Result<ThreadInfoReply, Status> {
        let id = thread_id(&req.thread_id)?;
        let (thread_key, log_key) = keys(&req.keys)?;
        let state = self.host_mut(host)?;
        if state.threads.contains_key(&id) {
            return Err(Status::new(
                Code::AlreadyExists,
                format!("thread {} already exists", id),
            ));
        }

        let key = thread_key.unwrap_or_else(|| ThreadKey::generate(true));
        let thread = state.open_thread(&id, key, log_key);
        let reply = ThreadInfoReply::from(&thread.info);
        state.threads.insert(id.clone(), thread);
        tracing::debug!("{} created thread {}", host, id);
        Ok(reply)
    }

    fn add_thread(&mut self, host: &str, req: AddThreadRequest) -> Result<ThreadInfoReply, Status> {
        let addr = Addr::from_bytes(&req.addr).map_err(invalid)?;
        let id: ThreadId = addr
            .value_for("thread")
            .ok_or_else(|| invalid(format!("{} has no thread component", addr)))?
            .parse()
            .map_err(invalid)?;
        let source = addr
            .value_for(PROTOCOL)
            .ok_or_else(|| invalid(format!("{} names no host", addr)))?
            .to_string();
        let (thread_key, log_key) = keys(&req.keys)?;
        let key = thread_key
            .ok_or_else(|| invalid("joining a thread requires its service key"))?;

        if self.host(host)?.threads.contains_key(&id) {
            return Err(Status::new(
                Code::AlreadyExists,
                format!("thread {} already exists", id),
            ));
        }
        let mut thread = self.host(&source)?.thread(&id)?.replica(key);

        let state = self.host_mut(host)?;
        thread.info.addrs.insert(thread_addr(host, &id));
        thread.info.insert_log(state.log_for(log_key));
        thread.peers.insert(source.clone());
        let reply = ThreadInfoReply::from(&thread.info);
        state.threads.insert(id.clone(), thread);

        self.link(&source, host, &id)?;
        tracing::debug!("{} joined thread {} from {}", host, id, source);
        Ok(reply)
    }

    /// Record `peer` as a replicator of `id` on `host`
    fn link(&mut self, host: &str, peer: &str, id: &ThreadId) -> Result<(), Status> {
        self.host_mut(host)?
            .thread_mut(id)?
            .peers
            .insert(peer.to_string());
        Ok(())
    }

    fn get_thread(&self, host: &str, req: GetThreadRequest) -> Result<ThreadInfoReply, Status> {
        let id = thread_id(&req.thread_id)?;
        let thread = self.host(host)?.thread(&id)?;
        Ok(ThreadInfoReply::from(&thread.info))
    }

    fn pull_thread(&mut self, host: &str, req: PullThreadRequest) -> Result<Empty, Status> {
        let id = thread_id(&req.thread_id)?;
        let peers = self.host(host)?.thread(&id)?.peers.clone();
        for peer in peers {
            let added = self.sync(&peer, host, &id);
            tracing::debug!("{} pulled {} records of {} from {}", host, added, id, peer);
        }
        Ok(Empty)
    }

    fn delete_thread(&mut self, host: &str, req: DeleteThreadRequest) -> Result<Empty, Status> {
        let id = thread_id(&req.thread_id)?;
        let thread = self
            .host_mut(host)?
            .threads
            .remove(&id)
            .ok_or_else(|| not_found(&id))?;
        for peer in thread.peers {
            if let Some(replica) = self
                .hosts
                .get_mut(&peer)
                .and_then(|state| state.threads.get_mut(&id))
            {
                replica.peers.remove(host);
            }
        }
        tracing::debug!("{} deleted thread {}", host, id);
        Ok(Empty)
    }

    fn add_replicator(&mut self, host: &str, req: AddReplicatorRequest) -> Result<AddReplicatorReply, Status> {
        let id = thread_id(&req.thread_id)?;
        let addr = Addr::from_bytes(&req.addr).map_err(invalid)?;
        let target = addr
            .value_for(PROTOCOL)
            .ok_or_else(|| invalid(format!("{} names no host", addr)))?
            .to_string();

        let thread = self.host(host)?.thread(&id)?;
        let key = thread
            .info
            .key
            .as_ref()
            .map(ThreadKey::service_only)
            .ok_or_else(|| Status::new(Code::FailedPrecondition, "thread has no service key"))?;
        let mut replica = thread.replica(key);

        let target_state = self.host_mut(&target)?;
        let peer_id = target_state.peer_id();
        if !target_state.threads.contains_key(&id) {
            replica.info.addrs.insert(thread_addr(&target, &id));
            replica.peers.insert(host.to_string());
            target_state.threads.insert(id.clone(), replica);
        } else {
            target_state.thread_mut(&id)?.peers.insert(host.to_string());
        }

        self.link(host, &target, &id)?;
        tracing::debug!("{} added replicator {} to thread {}", host, target, id);
        Ok(AddReplicatorReply {
            peer_id: peer_id.to_bytes(),
        })
    }

    fn create_record(&mut self, host: &str, req: CreateRecordRequest) -> Result<NewRecordReply, Status> {
        let id = thread_id(&req.thread_id)?;
        let thread = self.host_mut(host)?.thread_mut(&id)?;
        let key = thread
            .info
            .key
            .clone()
            .filter(ThreadKey::can_read)
            .ok_or_else(|| Status::new(Code::FailedPrecondition, "host does not hold the read key"))?;

        let log = match thread.info.owned_log() {
            Some(log) => log.clone(),
            None => {
                let log = LogInfo::owned(SecretKey::generate());
                thread.info.insert_log(log.clone());
                log
            }
        };
        let writer = log
            .priv_key
            .as_ref()
            .ok_or_else(|| Status::new(Code::Internal, "owned log without a private key"))?;

        let body = Block::from_bytes(req.body);
        let record = Event::create(&body, key.read().ok_or_else(|| invalid("no read key"))?)
            .and_then(|event| Record::create(event, writer, log.head, key.service()))
            .map_err(|e| Status::new(Code::Internal, e.to_string()))?;

        let reply = NewRecordReply {
            thread_id: id.to_bytes(),
            log_id: log.id.to_bytes(),
            record: record.to_envelope(),
        };
        self.append(host, &id, record)?;
        Ok(reply)
    }

    fn add_record(&mut self, host: &str, req: AddRecordRequest) -> Result<Empty, Status> {
        let id = thread_id(&req.thread_id)?;
        let log_id = LogId::from_bytes(&req.log_id).map_err(invalid)?;
        let thread = self.host(host)?.thread(&id)?;
        let key = thread
            .info
            .key
            .as_ref()
            .ok_or_else(|| Status::new(Code::FailedPrecondition, "thread has no service key"))?;

        let record = Record::from_envelope(&req.record, key.service()).map_err(invalid)?;
        if record.log_id() != log_id {
            return Err(invalid(format!(
                "record signed by {} added to log {}",
                record.log_id(),
                log_id
            )));
        }
        self.append(host, &id, record)?;
        Ok(Empty)
    }

    fn get_record(&self, host: &str, req: GetRecordRequest) -> Result<GetRecordReply, Status> {
        let id = thread_id(&req.thread_id)?;
        let cid = Cid::try_from(req.record_id.as_slice()).map_err(invalid)?;
        let record = self
            .host(host)?
            .thread(&id)?
            .records
            .get(&cid)
            .map(Record::to_envelope)
            .unwrap_or_else(RecordEnvelope::default);
        Ok(GetRecordReply { record })
    }

    /// Store `record` on `host`, notify its subscribers and push it to peers
    fn append(&mut self, host: &str, id: &ThreadId, record: Record) -> Result<(), Status> {
        let state = self.host_mut(host)?;
        let push = state.push;
        let thread = state.thread_mut(id)?;
        thread.append(record.clone())?;
        let peers = if push {
            thread.peers.clone()
        } else {
            BTreeSet::new()
        };
        state.notify(id, &record);
        tracing::debug!("{} appended {} to {}", host, record.cid(), id);

        for peer in peers {
            self.sync(host, &peer, id);
        }
        Ok(())
    }

    /// Copy records of `id` that `to` is missing from `from`
    fn sync(&mut self, from: &str, to: &str, id: &ThreadId) -> usize {
        let Some(pending) = self
            .hosts
            .get(from)
            .and_then(|state| state.threads.get(id))
            .map(HostThread::records)
        else {
            return 0;
        };
        let Some(state) = self.hosts.get_mut(to) else {
            return 0;
        };
        let Some(thread) = state.threads.get_mut(id) else {
            return 0;
        };

        let mut added = Vec::new();
        for record in pending {
            if thread.has_record(record.cid()) {
                continue;
            }
            match thread.append(record.clone()) {
                Ok(()) => added.push(record),
                Err(status) => {
                    tracing::debug!("{} rejected {} from {}: {}", to, record.cid(), from, status)
                }
            }
        }
        for record in &added {
            state.notify(id, record);
        }
        added.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::thread::Variant;

    fn network(names: &[&str]) -> NetworkState {
        let mut state = NetworkState::default();
        for name in names {
            state.hosts.insert(name.to_string(), HostState::new(name));
        }
        state
    }

    fn create(state: &mut NetworkState, host: &str, id: &ThreadId) -> ThreadInfo {
        let request = CreateThreadRequest {
            thread_id: id.to_bytes(),
            keys: Keys::default(),
        };
        ThreadInfo::try_from(state.create_thread(host, request).unwrap()).unwrap()
    }

    fn write(state: &mut NetworkState, host: &str, id: &ThreadId, body: &str) -> NewRecordReply {
        let request = CreateRecordRequest {
            thread_id: id.to_bytes(),
            body: Block::encode(&body).unwrap().into_data(),
        };
        state.create_record(host, request).unwrap()
    }

    #[test]
    fn test_create_thread_twice_fails() {
        let mut state = network(&["a"]);
        let id = ThreadId::random(Variant::Raw, 32);
        let info = create(&mut state, "a", &id);
        assert!(info.key.as_ref().is_some_and(ThreadKey::can_read));
        assert_eq!(info.logs.len(), 1);
        assert!(info.owned_log().is_some());

        let again = CreateThreadRequest {
            thread_id: id.to_bytes(),
            keys: Keys::default(),
        };
        let err = state.create_thread("a", again).unwrap_err();
        assert_eq!(err.code, Code::AlreadyExists);
    }

    #[test]
    fn test_records_chain_per_log() {
        let mut state = network(&["a"]);
        let id = ThreadId::random(Variant::Raw, 32);
        create(&mut state, "a", &id);
        let first = write(&mut state, "a", &id, "one");
        let second = write(&mut state, "a", &id, "two");
        assert_eq!(first.log_id, second.log_id);

        let thread = state.host("a").unwrap().thread(&id).unwrap();
        let records = thread.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].prev(), Some(records[0].cid()));
        let log = thread.info.owned_log().unwrap();
        assert_eq!(log.head.as_ref(), Some(records[1].cid()));
    }

    #[test]
    fn test_replicator_receives_records() {
        let mut state = network(&["a", "b"]);
        let id = ThreadId::random(Variant::Raw, 32);
        create(&mut state, "a", &id);
        write(&mut state, "a", &id, "before");

        let request = AddReplicatorRequest {
            thread_id: id.to_bytes(),
            addr: host_addr("b").to_bytes(),
        };
        let reply = state.add_replicator("a", request).unwrap();
        assert_eq!(reply.peer_id, state.host("b").unwrap().peer_id().to_bytes());

        write(&mut state, "a", &id, "after");
        let replica = state.host("b").unwrap().thread(&id).unwrap();
        assert_eq!(replica.records().len(), 2);
        assert!(!replica.info.key.as_ref().unwrap().can_read());
        assert!(replica.info.owned_log().is_none());
    }

    #[test]
    fn test_missing_record_is_empty() {
        let mut state = network(&["a"]);
        let id = ThreadId::random(Variant::Raw, 32);
        create(&mut state, "a", &id);
        let request = GetRecordRequest {
            thread_id: id.to_bytes(),
            record_id: common::linked_data::cid_for(b"nothing").to_bytes(),
        };
        let reply = state.get_record("a", request).unwrap();
        assert!(reply.record.is_empty());
    }

    #[test]
    fn test_unknown_method() {
        let mut state = network(&["a"]);
        let err = state.dispatch("a", "Nope", &[]).unwrap_err();
        assert_eq!(err.code, Code::Unimplemented);
    }
}
