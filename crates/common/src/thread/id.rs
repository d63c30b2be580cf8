use std::fmt;
use std::str::FromStr;

use crate::linked_data::multibase::{self, Base};

use super::IdError;

/// Version of the ThreadID format
pub const THREAD_ID_VERSION: u64 = 0x01;
/// Random payload size used when none is given
pub const DEFAULT_THREAD_ID_SIZE: usize = 32;

/// Access model of a Thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    /// Plain thread, anyone with the keys may write
    Raw,
    /// Thread governed by an access-control log
    AccessControlled,
}

impl Variant {
    pub fn code(self) -> u64 {
        match self {
            Variant::Raw => 0x55,
            Variant::AccessControlled => 0x70,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(Variant::Raw),
            0x70 => Some(Variant::AccessControlled),
            _ => None,
        }
    }
}

/// Self-describing Thread identifier
///
/// Binary form: `varint(version) || varint(variant) || random payload`.
/// String form: multibase base32 (lowercase) of the binary form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(Vec<u8>);

impl ThreadId {
    /// Generate a fresh id with `size` random payload bytes
    pub fn random(variant: Variant, size: usize) -> Self {
        let mut payload = vec![0u8; size.max(1)];
        getrandom::getrandom(&mut payload).expect("failed to generate random bytes");

        let mut bytes = Vec::with_capacity(payload.len() + 4);
        write_uvarint(&mut bytes, THREAD_ID_VERSION);
        write_uvarint(&mut bytes, variant.code());
        bytes.extend_from_slice(&payload);
        Self(bytes)
    }

    /// Parse and validate the binary form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        let (version, rest) =
            read_uvarint(bytes).ok_or_else(|| IdError::Thread("truncated version".into()))?;
        if version != THREAD_ID_VERSION {
            return Err(IdError::Thread(format!("unsupported version {}", version)));
        }
        let (variant, payload) =
            read_uvarint(rest).ok_or_else(|| IdError::Thread("truncated variant".into()))?;
        if Variant::from_code(variant).is_none() {
            return Err(IdError::Thread(format!("unknown variant {:#x}", variant)));
        }
        if payload.is_empty() {
            return Err(IdError::Thread("empty payload".into()));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    pub fn variant(&self) -> Variant {
        // validated on construction
        read_uvarint(&self.0)
            .and_then(|(_, rest)| read_uvarint(rest))
            .and_then(|(code, _)| Variant::from_code(code))
            .unwrap_or(Variant::Raw)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", multibase::encode(Base::Base32Lower, &self.0))
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self)
    }
}

impl FromStr for ThreadId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, bytes) = multibase::decode(s).map_err(|e| IdError::Thread(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

fn write_uvarint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_uvarint(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if (byte & 0x80) == 0 {
            return Some((value, &bytes[i + 1..]));
        }
    }
    None
}
