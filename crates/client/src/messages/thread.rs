use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use common::crypto::{PublicKey, Secret, SecretKey};
use common::linked_data::Cid;
use common::thread::{Addr, LogId, LogInfo, ThreadId, ThreadInfo, ThreadKey};

use super::{Empty, Request};
use crate::error::Error;
use crate::options::LogKey;

/// Log key as sent to the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKeyMessage {
    Public(#[serde(with = "serde_bytes")] Vec<u8>),
    Private(#[serde(with = "serde_bytes")] Vec<u8>),
}

/// Key material attached to create/add thread requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keys {
    #[serde(with = "serde_bytes")]
    pub read_key: Option<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pub service_key: Option<Vec<u8>>,
    pub log_key: Option<LogKeyMessage>,
}

impl Keys {
    pub fn new(thread_key: Option<&ThreadKey>, log_key: Option<&LogKey>) -> Self {
        Self {
            read_key: thread_key
                .and_then(ThreadKey::read)
                .map(|k| k.bytes().to_vec()),
            service_key: thread_key.map(|k| k.service().bytes().to_vec()),
            log_key: log_key.map(|key| match key {
                LogKey::Public(key) => LogKeyMessage::Public(key.marshal()),
                LogKey::Private(key) => LogKeyMessage::Private(key.marshal()),
            }),
        }
    }

    /// The Thread keys carried, `None` without a service key
    pub fn thread_key(&self) -> Result<Option<ThreadKey>, Error> {
        thread_key(self.service_key.as_deref(), self.read_key.as_deref())
    }

    pub fn log_key(&self) -> Result<Option<LogKey>, Error> {
        let key = match &self.log_key {
            None => return Ok(None),
            Some(LogKeyMessage::Public(bytes)) => LogKey::Public(
                PublicKey::unmarshal(bytes).map_err(|e| Error::Decode(e.to_string()))?,
            ),
            Some(LogKeyMessage::Private(bytes)) => LogKey::Private(
                SecretKey::unmarshal(bytes).map_err(|e| Error::Decode(e.to_string()))?,
            ),
        };
        Ok(Some(key))
    }
}

fn secret(bytes: &[u8]) -> Result<Secret, Error> {
    Secret::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
}

fn thread_key(service: Option<&[u8]>, read: Option<&[u8]>) -> Result<Option<ThreadKey>, Error> {
    let Some(service) = service else {
        if read.is_some() {
            tracing::debug!("ignoring read key sent without a service key");
        }
        return Ok(None);
    };
    let read = read.map(secret).transpose()?;
    Ok(Some(ThreadKey::new(secret(service)?, read)))
}

fn cid(bytes: &[u8]) -> Result<Cid, Error> {
    Cid::try_from(bytes).map_err(|e| Error::Decode(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInfoMessage {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub pub_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub priv_key: Option<Vec<u8>>,
    pub addrs: Vec<ByteBuf>,
    #[serde(with = "serde_bytes")]
    pub head: Option<Vec<u8>>,
}

impl From<&LogInfo> for LogInfoMessage {
    fn from(log: &LogInfo) -> Self {
        Self {
            id: log.id.to_bytes(),
            pub_key: log.pub_key.marshal(),
            priv_key: log.priv_key.as_ref().map(SecretKey::marshal),
            addrs: log.addrs.iter().map(|a| ByteBuf::from(a.to_bytes())).collect(),
            head: log.head.map(|c| c.to_bytes()),
        }
    }
}

impl TryFrom<LogInfoMessage> for LogInfo {
    type Error = Error;

    fn try_from(message: LogInfoMessage) -> Result<Self, Self::Error> {
        let id = LogId::from_bytes(&message.id)?;
        let pub_key =
            PublicKey::unmarshal(&message.pub_key).map_err(|e| Error::Decode(e.to_string()))?;
        if !id.matches(&pub_key) {
            return Err(Error::KeyMismatch(id));
        }
        let priv_key = message
            .priv_key
            .map(|bytes| SecretKey::unmarshal(&bytes))
            .transpose()
            .map_err(|e| Error::Decode(e.to_string()))?;

        Ok(LogInfo {
            id,
            pub_key,
            priv_key,
            addrs: message
                .addrs
                .iter()
                .map(|a| Addr::from_bytes(a))
                .collect::<Result<_, _>>()?,
            head: message.head.as_deref().map(cid).transpose()?,
        })
    }
}

/// Full snapshot of a Thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfoReply {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub read_key: Option<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pub service_key: Option<Vec<u8>>,
    pub logs: Vec<LogInfoMessage>,
    pub addrs: Vec<ByteBuf>,
}

impl From<&ThreadInfo> for ThreadInfoReply {
    fn from(info: &ThreadInfo) -> Self {
        Self {
            id: info.id.to_bytes(),
            read_key: info
                .key
                .as_ref()
                .and_then(ThreadKey::read)
                .map(|k| k.bytes().to_vec()),
            service_key: info.key.as_ref().map(|k| k.service().bytes().to_vec()),
            logs: info.logs.values().map(LogInfoMessage::from).collect(),
            addrs: info
                .addrs
                .iter()
                .map(|a| ByteBuf::from(a.to_bytes()))
                .collect(),
        }
    }
}

impl TryFrom<ThreadInfoReply> for ThreadInfo {
    type Error = Error;

    fn try_from(reply: ThreadInfoReply) -> Result<Self, Self::Error> {
        let key = thread_key(reply.service_key.as_deref(), reply.read_key.as_deref())?;
        let mut info = ThreadInfo::new(ThreadId::from_bytes(&reply.id)?, key);
        for log in reply.logs {
            info.insert_log(LogInfo::try_from(log)?);
        }
        for addr in &reply.addrs {
            info.addrs.insert(Addr::from_bytes(addr)?);
        }
        Ok(info)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
    pub keys: Keys,
}

impl Request for CreateThreadRequest {
    const METHOD: &'static str = "CreateThread";
    type Reply = ThreadInfoReply;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddThreadRequest {
    #[serde(with = "serde_bytes")]
    pub addr: Vec<u8>,
    pub keys: Keys,
}

impl Request for AddThreadRequest {
    const METHOD: &'static str = "AddThread";
    type Reply = ThreadInfoReply;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetThreadRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
}

impl Request for GetThreadRequest {
    const METHOD: &'static str = "GetThread";
    type Reply = ThreadInfoReply;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullThreadRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
}

impl Request for PullThreadRequest {
    const METHOD: &'static str = "PullThread";
    type Reply = Empty;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteThreadRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
}

impl Request for DeleteThreadRequest {
    const METHOD: &'static str = "DeleteThread";
    type Reply = Empty;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReplicatorRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub addr: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReplicatorReply {
    #[serde(with = "serde_bytes")]
    pub peer_id: Vec<u8>,
}

impl Request for AddReplicatorRequest {
    const METHOD: &'static str = "AddReplicator";
    type Reply = AddReplicatorReply;
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::thread::Variant;

    #[test]
    fn test_thread_info_conversion() {
        let owner = SecretKey::generate();
        let mut info = ThreadInfo::new(
            ThreadId::random(Variant::AccessControlled, 32),
            Some(ThreadKey::generate(true)),
        );
        let mut log = LogInfo::owned(owner);
        log.addrs.insert("/memory/host1".parse().unwrap());
        info.insert_log(log);
        info.insert_log(LogInfo::new(SecretKey::generate().public()));
        info.addrs
            .insert(format!("/memory/host1/thread/{}", info.id).parse().unwrap());

        let reply = ThreadInfoReply::from(&info);
        let bytes = super::super::encode(&reply).unwrap();
        let decoded: ThreadInfoReply = super::super::decode(&bytes).unwrap();
        assert_eq!(ThreadInfo::try_from(decoded).unwrap(), info);
    }

    #[test]
    fn test_service_only_keys() {
        let key = ThreadKey::generate(true).service_only();
        let keys = Keys::new(Some(&key), None);
        assert!(keys.read_key.is_none());
        assert_eq!(keys.thread_key().unwrap(), Some(key));
        assert!(keys.log_key().unwrap().is_none());

        assert_eq!(Keys::default().thread_key().unwrap(), None);
    }

    #[test]
    fn test_log_id_must_match_key() {
        let mut message = LogInfoMessage::from(&LogInfo::new(SecretKey::generate().public()));
        message.pub_key = SecretKey::generate().public().marshal();
        assert!(matches!(
            LogInfo::try_from(message),
            Err(Error::KeyMismatch(_))
        ));
    }
}
