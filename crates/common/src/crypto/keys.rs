use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::linked_data::multibase::{self, Base};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Key type tag prepended to marshaled keys
pub const KEY_TYPE_ED25519: u8 = 0x01;
/// Size of a marshaled key (type tag + key bytes)
pub const MARSHALED_KEY_SIZE: usize = 1 + PUBLIC_KEY_SIZE;

const PEM_TAG: &str = "PRIVATE KEY";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("unsupported key type {0:#04x}")]
    UnsupportedType(u8),
    #[error("empty key")]
    Empty,
    #[error("not an ed25519 point: {0}")]
    InvalidPoint(#[from] ed25519_dalek::SignatureError),
    #[error("signature does not verify")]
    BadSignature,
    #[error("multibase: {0}")]
    Multibase(String),
    #[error("pem: {0}")]
    Pem(#[from] pem::PemError),
    #[error("unexpected pem tag {0:?}")]
    PemTag(String),
}

fn exact<const N: usize>(bytes: &[u8]) -> Result<[u8; N], KeyError> {
    bytes.try_into().map_err(|_| KeyError::InvalidLength {
        expected: N,
        got: bytes.len(),
    })
}

fn split_tag(bytes: &[u8]) -> Result<&[u8], KeyError> {
    match bytes.split_first() {
        Some((&KEY_TYPE_ED25519, key)) => Ok(key),
        Some((&tag, _)) => Err(KeyError::UnsupportedType(tag)),
        None => Err(KeyError::Empty),
    }
}

fn tagged(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(KEY_TYPE_ED25519);
    out.extend_from_slice(key);
    out
}

/// Public half of an Ed25519 keypair
///
/// Verifies record signatures, derives Log and peer identifiers, and is the
/// user key submitted during the token handshake. Marshaled as
/// `KEY_TYPE_ED25519 || key`, which is what the KeyBook persists and what
/// crosses the wire; the string form is that in multibase base32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&multibase::encode(Base::Base32Lower, self.marshal()))
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, bytes) = multibase::decode(s).map_err(|e| KeyError::Multibase(e.to_string()))?;
        Self::unmarshal(&bytes)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(exact(bytes)?)
    }
}

impl PublicKey {
    /// Rejects byte strings that are not a point on the curve
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    pub fn marshal(&self) -> Vec<u8> {
        tagged(&self.0)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, KeyError> {
        Self::try_from(split_tag(bytes)?)
    }

    pub fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), KeyError> {
        VerifyingKey::from_bytes(&self.0)?
            .verify_strict(msg, signature)
            .map_err(|_| KeyError::BadSignature)
    }
}

/// Private half of an Ed25519 keypair
///
/// Held by Log owners to sign records and by users to answer the token
/// challenge. It only reaches the service when a caller hands a private Log
/// key to `create_thread` on the bare client.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&self.public()).finish()
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.public() == other.public()
    }
}

impl Eq for SecretKey {}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(seed: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&seed))
    }
}

impl SecretKey {
    pub fn generate() -> Self {
        let mut seed = [0u8; PRIVATE_KEY_SIZE];
        // an OS without an entropy source cannot create identities at all
        getrandom::getrandom(&mut seed).expect("operating system entropy source");
        Self::from(seed)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn marshal(&self) -> Vec<u8> {
        tagged(&self.to_bytes())
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, KeyError> {
        Ok(Self::from(exact(split_tag(bytes)?)?))
    }

    /// PEM ("PRIVATE KEY") form used for the identity file
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PEM_TAG, self.to_bytes()))
    }

    pub fn from_pem(s: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(s)?;
        if pem.tag() != PEM_TAG {
            return Err(KeyError::PemTag(pem.tag().to_string()));
        }
        Ok(Self::from(exact(pem.contents())?))
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.0.sign(msg)
    }
}
