//! Symmetric keys for Thread content
//!
//! A Thread carries two long-lived symmetric keys: the service key, which
//! wraps every record envelope, and the optional read key, which wraps the
//! event header. Each record body gets a fresh one-off key that travels inside
//! the header. All three are a [`Secret`].
//!
//! Sealed layout: `nonce (12) || aead(digest (32) || plaintext) || tag (16)`,
//! where `digest` is the BLAKE3 hash of the plaintext.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of a Thread symmetric key in bytes
pub const SECRET_SIZE: usize = 32;
/// Size of the plaintext digest sealed alongside the content
pub const BLAKE3_HASH_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("sealed payload truncated ({0} bytes)")]
    Truncated(usize),
    #[error("cipher failure, wrong key or tampered payload")]
    Cipher,
    #[error("plaintext digest mismatch")]
    Digest,
    #[error("no entropy available: {0}")]
    Entropy(getrandom::Error),
}

/// A 256-bit key for sealing and opening Thread content
///
/// ```ignore
/// let read_key = Secret::generate();
/// let sealed = read_key.encrypt(b"event header")?;
/// assert_eq!(read_key.decrypt(&sealed)?, b"event header");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_SIZE]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Secret {
    type Error = SecretError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; SECRET_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| SecretError::InvalidLength {
                expected: SECRET_SIZE,
                got: bytes.len(),
            })
    }
}

fn fill_random<const N: usize>() -> Result<[u8; N], SecretError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(SecretError::Entropy)?;
    Ok(buf)
}

impl Secret {
    /// Fresh random key
    pub fn generate() -> Self {
        // an OS without an entropy source cannot create Threads at all
        Self(fill_random().expect("operating system entropy source"))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SecretError> {
        Self::try_from(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Seal `plaintext` under this key with a random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
        let nonce: [u8; NONCE_SIZE] = fill_random()?;

        let mut framed = Vec::with_capacity(BLAKE3_HASH_SIZE + plaintext.len());
        framed.extend_from_slice(blake3::hash(plaintext).as_bytes());
        framed.extend_from_slice(plaintext);

        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), framed.as_slice())
            .map_err(|_| SecretError::Cipher)?;

        let mut out = nonce.to_vec();
        out.extend(sealed);
        Ok(out)
    }

    /// Open a payload produced by [`Secret::encrypt`]
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, SecretError> {
        if sealed.len() < NONCE_SIZE {
            return Err(SecretError::Truncated(sealed.len()));
        }
        let (nonce, body) = sealed.split_at(NONCE_SIZE);

        let mut framed = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| SecretError::Cipher)?;
        if framed.len() < BLAKE3_HASH_SIZE {
            return Err(SecretError::Truncated(sealed.len()));
        }

        let plaintext = framed.split_off(BLAKE3_HASH_SIZE);
        if blake3::hash(&plaintext).as_bytes()[..] != framed[..] {
            return Err(SecretError::Digest);
        }
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let key = Secret::generate();
        let sealed = key.encrypt(b"record body").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + BLAKE3_HASH_SIZE + 11 + 16);
        assert_eq!(key.decrypt(&sealed).unwrap(), b"record body");
    }

    #[test]
    fn test_nonce_differs_per_seal() {
        let key = Secret::generate();
        assert_ne!(key.encrypt(b"same").unwrap(), key.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_key_length() {
        assert!(matches!(
            Secret::from_slice(&[0u8; 16]),
            Err(SecretError::InvalidLength { expected: 32, got: 16 })
        ));
        assert!(Secret::from_slice(&[0u8; 33]).is_err());

        let key = Secret::from_slice(&[9u8; SECRET_SIZE]).unwrap();
        assert_eq!(key, Secret::from([9u8; SECRET_SIZE]));
    }

    #[test]
    fn test_open_with_other_key() {
        let service = Secret::generate();
        let sealed = service.encrypt(b"envelope").unwrap();
        assert!(matches!(
            Secret::generate().decrypt(&sealed),
            Err(SecretError::Cipher)
        ));
    }

    #[test]
    fn test_open_tampered_or_short() {
        let key = Secret::generate();
        let mut sealed = key.encrypt(b"header bytes").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(key.decrypt(&sealed), Err(SecretError::Cipher)));

        assert!(matches!(
            key.decrypt(&[0u8; 5]),
            Err(SecretError::Truncated(5))
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = Secret::generate();
        let sealed = key.encrypt(&[]).unwrap();
        assert!(key.decrypt(&sealed).unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts() {
        assert_eq!(format!("{:?}", Secret::from([1u8; SECRET_SIZE])), "Secret(..)");
    }
}
