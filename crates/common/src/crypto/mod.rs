//! Cryptographic primitives for Threads
//!
//! This module provides the cryptographic foundation for the Thread security model:
//!
//! - **Identity & Authentication**: Ed25519 keypairs identify users (token handshake)
//!   and Log owners (record signatures)
//! - **Encryption**: ChaCha20-Poly1305 `Secret`s for the Thread service key, the
//!   Thread read key, and the per-record body key
//!
//! # Security Model
//!
//! ## Log Ownership
//! Every Log is written by exactly one Ed25519 keypair. The Log's identifier is
//! derived from the public half (see [`crate::thread::PeerId`]), so a public key
//! can always be checked against the Log it claims to belong to.
//!
//! ## Thread Keys
//! A Thread carries two independent symmetric keys:
//! - the *service* key seals the record node, so holders can relay and verify
//!   the chain;
//! - the *read* key seals the record header, which in turn carries the key for
//!   the body. Without it, content stays opaque.

mod keys;
mod secret;

pub use ed25519_dalek::Signature;
pub use keys::{
    KeyError, PublicKey, SecretKey, KEY_TYPE_ED25519, MARSHALED_KEY_SIZE, PRIVATE_KEY_SIZE,
    PUBLIC_KEY_SIZE,
};
pub use secret::{Secret, SecretError, BLAKE3_HASH_SIZE, NONCE_SIZE, SECRET_SIZE};
