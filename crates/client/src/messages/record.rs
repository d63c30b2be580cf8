use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use common::record::RecordEnvelope;

use super::{Empty, Request};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
    /// DAG-CBOR bytes of the body block
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

/// A record appended to a Log, echoed by create and pushed by subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecordReply {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub log_id: Vec<u8>,
    pub record: RecordEnvelope,
}

impl Request for CreateRecordRequest {
    const METHOD: &'static str = "CreateRecord";
    type Reply = NewRecordReply;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRecordRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub log_id: Vec<u8>,
    pub record: RecordEnvelope,
}

impl Request for AddRecordRequest {
    const METHOD: &'static str = "AddRecord";
    type Reply = Empty;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRecordRequest {
    #[serde(with = "serde_bytes")]
    pub thread_id: Vec<u8>,
    /// CID bytes of the record node
    #[serde(with = "serde_bytes")]
    pub record_id: Vec<u8>,
}

/// An empty envelope means the service holds no such record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRecordReply {
    pub record: RecordEnvelope,
}

impl Request for GetRecordRequest {
    const METHOD: &'static str = "GetRecord";
    type Reply = GetRecordReply;
}

/// Empty `thread_ids` subscribes to every Thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub thread_ids: Vec<ByteBuf>,
}
