use async_trait::async_trait;

use crate::crypto::{PublicKey, SecretKey, Signature};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("signer failed: {0}")]
    Signer(String),
}

/// A user identity able to answer the token handshake
///
/// The handshake only needs the public key and a signature over the exact
/// challenge bytes, so the private half may live anywhere (a local key, a
/// hardware token, a remote signer).
#[async_trait]
pub trait Identity: Send + Sync {
    /// The public key submitted at the start of the handshake
    fn public(&self) -> PublicKey;

    /// Sign exactly the given bytes
    async fn sign(&self, data: &[u8]) -> Result<Signature, IdentityError>;
}

#[async_trait]
impl Identity for SecretKey {
    fn public(&self) -> PublicKey {
        SecretKey::public(self)
    }

    async fn sign(&self, data: &[u8]) -> Result<Signature, IdentityError> {
        Ok(SecretKey::sign(self, data))
    }
}
