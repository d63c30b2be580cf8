//! Content-addressed blocks
//!
//! Every node of a record is a canonical DAG-CBOR block addressed by a CIDv1
//! (codec dag-cbor, sha2-256 multihash). Encrypted nodes are DAG-CBOR byte
//! strings whose contents are the ciphertext, so they stay addressable even
//! when nobody on the path can read them.

use multihash::Multihash;
use serde::{de::DeserializeOwned, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};

use crate::crypto::{Secret, SecretError};

pub use cid::Cid;
pub use ipld_core::ipld::Ipld;
pub use cid::multibase;

/// Multicodec code for DAG-CBOR
pub const DAG_CBOR: u64 = 0x71;
/// Multihash code for sha2-256
pub const SHA2_256: u64 = 0x12;

#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("failed to encode block: {0}")]
    Encode(String),
    #[error("failed to decode block: {0}")]
    Decode(String),
    #[error("invalid cid: {0}")]
    Cid(#[from] cid::Error),
    #[error("block content does not match {expected} (got {actual})")]
    CidMismatch { expected: Cid, actual: Cid },
    #[error("sealed block error: {0}")]
    Secret(#[from] SecretError),
}

/// Compute the CID of some DAG-CBOR bytes
pub fn cid_for(data: &[u8]) -> Cid {
    let digest = Sha256::digest(data);
    // a 32 byte digest always fits a 64 byte multihash
    let hash = Multihash::<64>::wrap(SHA2_256, &digest).expect("sha2-256 digest fits");
    Cid::new_v1(DAG_CBOR, hash)
}

/// A DAG-CBOR block and its content address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Vec<u8>,
}

impl Block {
    /// Encode a value as canonical DAG-CBOR
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, BlockError> {
        let data =
            serde_ipld_dagcbor::to_vec(value).map_err(|e| BlockError::Encode(e.to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Wrap raw DAG-CBOR bytes, computing their CID
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let cid = cid_for(&data);
        Self { cid, data }
    }

    /// Wrap raw bytes that are expected to hash to `cid`
    pub fn with_cid(cid: Cid, data: Vec<u8>) -> Result<Self, BlockError> {
        let block = Self::from_bytes(data);
        if block.cid != cid {
            return Err(BlockError::CidMismatch {
                expected: cid,
                actual: block.cid,
            });
        }
        Ok(block)
    }

    /// Encrypt `plaintext` under `key` and wrap the ciphertext as a CBOR byte string
    pub fn seal(plaintext: &[u8], key: &Secret) -> Result<Self, BlockError> {
        let ciphertext = key.encrypt(plaintext)?;
        Self::encode(&ByteBuf::from(ciphertext))
    }

    /// Reverse of [`Block::seal`]
    pub fn open(&self, key: &Secret) -> Result<Vec<u8>, BlockError> {
        let ciphertext: ByteBuf = self.decode()?;
        Ok(key.decrypt(&ciphertext)?)
    }

    /// Decode the block into a value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BlockError> {
        serde_ipld_dagcbor::from_slice(&self.data).map_err(|e| BlockError::Decode(e.to_string()))
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
