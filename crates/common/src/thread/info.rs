use std::collections::{BTreeMap, BTreeSet};

use crate::crypto::{PublicKey, SecretKey};
use crate::linked_data::Cid;

use super::{Addr, LogId, ThreadId, ThreadKey};

/// What this peer knows about a single Log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogInfo {
    pub id: LogId,
    pub pub_key: PublicKey,
    /// Only present for Logs owned by the local identity
    pub priv_key: Option<SecretKey>,
    pub addrs: BTreeSet<Addr>,
    /// Latest record, absent while the Log is empty
    pub head: Option<Cid>,
}

impl LogInfo {
    /// A replica of somebody else's Log
    pub fn new(pub_key: PublicKey) -> Self {
        Self {
            id: LogId::from_public_key(&pub_key),
            pub_key,
            priv_key: None,
            addrs: BTreeSet::new(),
            head: None,
        }
    }

    /// A Log we can write to
    pub fn owned(priv_key: SecretKey) -> Self {
        let mut info = Self::new(priv_key.public());
        info.priv_key = Some(priv_key);
        info
    }

    pub fn is_owned(&self) -> bool {
        self.priv_key.is_some()
    }
}

/// Snapshot of a Thread as returned by every lookup
///
/// Logs are keyed by id, so the set never holds two entries for the same
/// writer and has no meaningful insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub key: Option<ThreadKey>,
    pub logs: BTreeMap<LogId, LogInfo>,
    pub addrs: BTreeSet<Addr>,
}

impl ThreadInfo {
    pub fn new(id: ThreadId, key: Option<ThreadKey>) -> Self {
        Self {
            id,
            key,
            logs: BTreeMap::new(),
            addrs: BTreeSet::new(),
        }
    }

    /// Insert or replace the entry for `log.id`
    pub fn insert_log(&mut self, log: LogInfo) -> Option<LogInfo> {
        self.logs.insert(log.id.clone(), log)
    }

    pub fn log(&self, id: &LogId) -> Option<&LogInfo> {
        self.logs.get(id)
    }

    /// The first Log whose private key is held locally
    pub fn owned_log(&self) -> Option<&LogInfo> {
        self.logs.values().find(|log| log.is_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Variant;

    #[test]
    fn test_logs_are_deduplicated_by_id() {
        let writer = SecretKey::generate();
        let mut info = ThreadInfo::new(ThreadId::random(Variant::Raw, 32), None);

        assert!(info.insert_log(LogInfo::new(writer.public())).is_none());
        let replaced = info.insert_log(LogInfo::owned(writer.clone()));
        assert!(replaced.is_some());
        assert_eq!(info.logs.len(), 1);

        let owned = info.owned_log().unwrap();
        assert_eq!(owned.id, LogId::from_secret_key(&writer));
        assert!(owned.head.is_none());
    }
}
