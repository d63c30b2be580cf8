use std::fmt;
use std::str::FromStr;

use multihash::Multihash;
use sha2::{Digest, Sha256};

use super::IdError;
use crate::crypto::{PublicKey, SecretKey};
use crate::linked_data::multibase::{self, Base};
use crate::linked_data::SHA2_256;

/// Identity derived from a public key
///
/// The bytes are the sha2-256 multihash of the marshaled public key, so the
/// id can be recomputed (and checked) from the key alone. String form is
/// multibase base58btc.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Vec<u8>);

/// A Log is identified by its writer
pub type LogId = PeerId;

impl PeerId {
    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = Sha256::digest(key.marshal());
        let hash = Multihash::<64>::wrap(SHA2_256, &digest).expect("sha2-256 digest fits");
        Self(hash.to_bytes())
    }

    pub fn from_secret_key(key: &SecretKey) -> Self {
        Self::from_public_key(&key.public())
    }

    /// Whether this id was derived from `key`
    pub fn matches(&self, key: &PublicKey) -> bool {
        *self == Self::from_public_key(key)
    }

    /// Parse and validate the binary (multihash) form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        let hash =
            Multihash::<64>::from_bytes(bytes).map_err(|e| IdError::Peer(e.to_string()))?;
        if hash.code() != SHA2_256 || hash.digest().len() != 32 {
            return Err(IdError::Peer(format!(
                "expected a sha2-256 multihash, got code {:#x}",
                hash.code()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", multibase::encode(Base::Base58Btc, &self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl FromStr for PeerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, bytes) = multibase::decode(s).map_err(|e| IdError::Peer(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}
