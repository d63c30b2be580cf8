//! Request and reply types exchanged with the service
//!
//! Messages are `bincode` encoded. Identifiers, keys and nodes travel as
//! length-prefixed byte strings and are validated when converted into their
//! typed form.

use std::fmt::Debug;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

mod record;
mod thread;

pub use record::{
    AddRecordRequest, CreateRecordRequest, GetRecordReply, GetRecordRequest, NewRecordReply,
    SubscribeRequest,
};
pub use thread::{
    AddReplicatorReply, AddReplicatorRequest, AddThreadRequest, CreateThreadRequest,
    DeleteThreadRequest, GetThreadRequest, Keys, LogInfoMessage, LogKeyMessage,
    PullThreadRequest, ThreadInfoReply,
};

use crate::error::Error;

pub const GET_TOKEN: &str = "GetToken";
pub const SUBSCRIBE: &str = "Subscribe";

/// A unary request and the reply it expects
pub trait Request: Serialize + DeserializeOwned + Send + Sync + Debug {
    const METHOD: &'static str;
    type Reply: Serialize + DeserializeOwned + Send + Debug;
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, Error> {
    Ok(Bytes::from(bincode::serialize(message)?))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    Ok(bincode::deserialize(bytes)?)
}

/// Reply with no content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty;

/// Client side of the token handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetTokenRequest {
    /// Marshaled public key of the identity
    Key(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Signature over the challenge
    Signature(#[serde(with = "serde_bytes")] Vec<u8>),
}

/// Service side of the token handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetTokenReply {
    Challenge(#[serde(with = "serde_bytes")] Vec<u8>),
    Token(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHostIdRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHostIdReply {
    #[serde(with = "serde_bytes")]
    pub peer_id: Vec<u8>,
}

impl Request for GetHostIdRequest {
    const METHOD: &'static str = "GetHostID";
    type Reply = GetHostIdReply;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_messages_are_tagged() {
        let key = encode(&GetTokenRequest::Key(vec![1; 33])).unwrap();
        let sig = encode(&GetTokenRequest::Signature(vec![1; 33])).unwrap();
        assert_ne!(key, sig);

        let decoded: GetTokenRequest = decode(&sig).unwrap();
        assert_eq!(decoded, GetTokenRequest::Signature(vec![1; 33]));
        assert!(decode::<GetTokenReply>(&[0xff; 3]).is_err());
    }

    #[test]
    fn test_empty_is_zero_bytes() {
        assert!(encode(&Empty).unwrap().is_empty());
        assert_eq!(decode::<Empty>(&[]).unwrap(), Empty);
    }
}
