//! The four-node record codec
//!
//! ```text
//! record node (service key) ──► event node (plain) ──► header node (read key)
//!        │                                       └──► body node (record key)
//!        └──► previous record node
//! ```

mod event;
mod node;

use serde::{Deserialize, Serialize};

pub use event::{Event, Header};
pub use node::Record;

use crate::crypto::{KeyError, SecretError};
use crate::linked_data::{BlockError, Cid};
use crate::thread::{LogId, ThreadId};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("block error: {0}")]
    Block(#[from] BlockError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("signer failed: {0}")]
    Signer(String),
    #[error("invalid record signature")]
    Signature,
    #[error("broken record link: {0}")]
    Link(String),
    #[error("record written by {actual}, log belongs to {expected}")]
    WrongWriter { expected: LogId, actual: LogId },
    #[error("record does not extend the log head (head {expected:?}, prev {actual:?})")]
    Chain {
        expected: Option<Cid>,
        actual: Option<Cid>,
    },
}

/// The four raw nodes of a record as they travel on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    #[serde(with = "serde_bytes")]
    pub record_node: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub event_node: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub header_node: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub body_node: Vec<u8>,
}

impl RecordEnvelope {
    pub fn is_empty(&self) -> bool {
        self.record_node.is_empty()
    }
}

/// A record together with where it lives
///
/// `record` is absent when the record could not be reconstructed locally
/// (no key for the Thread), and on the terminal event of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub record: Option<Record>,
    pub thread_id: ThreadId,
    pub log_id: LogId,
}

impl ThreadRecord {
    pub fn new(record: Record, thread_id: ThreadId) -> Self {
        Self {
            log_id: record.log_id(),
            record: Some(record),
            thread_id,
        }
    }
}
