use crate::crypto::{Secret, SecretError, SECRET_SIZE};

/// Symmetric key material scoped to a Thread
///
/// The service key is always present once a Thread has keys at all; the read
/// key is optional. A peer holding only the service key can decode record
/// envelopes, verify the chain and relay records, but cannot open headers or
/// bodies. "No keys" is modeled one level up as `Option<ThreadKey>`.
///
/// Binary form: `service (32) || read (32)?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadKey {
    service: Secret,
    read: Option<Secret>,
}

impl ThreadKey {
    pub fn new(service: Secret, read: Option<Secret>) -> Self {
        Self { service, read }
    }

    /// Random key material, optionally without a read key
    pub fn generate(with_read: bool) -> Self {
        Self {
            service: Secret::generate(),
            read: with_read.then(Secret::generate),
        }
    }

    pub fn service(&self) -> &Secret {
        &self.service
    }

    pub fn read(&self) -> Option<&Secret> {
        self.read.as_ref()
    }

    /// Whether record content can be opened with this key
    pub fn can_read(&self) -> bool {
        self.read.is_some()
    }

    /// Copy holding only the service key, suitable for replicators
    pub fn service_only(&self) -> Self {
        Self {
            service: self.service.clone(),
            read: None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SECRET_SIZE * 2);
        out.extend_from_slice(self.service.bytes());
        if let Some(read) = &self.read {
            out.extend_from_slice(read.bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SecretError> {
        match bytes.len() {
            SECRET_SIZE => Ok(Self::new(Secret::from_slice(bytes)?, None)),
            len if len == SECRET_SIZE * 2 => Ok(Self::new(
                Secret::from_slice(&bytes[..SECRET_SIZE])?,
                Some(Secret::from_slice(&bytes[SECRET_SIZE..])?),
            )),
            len => Err(SecretError::InvalidLength {
                expected: SECRET_SIZE * 2,
                got: len,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_key_bytes() {
        let key = ThreadKey::generate(true);
        assert!(key.can_read());

        let bytes = key.to_bytes();
        assert_eq!(bytes.len(), SECRET_SIZE * 2);
        assert_eq!(ThreadKey::from_bytes(&bytes).unwrap(), key);
    }

    #[test]
    fn test_service_only_key_bytes() {
        let key = ThreadKey::generate(true).service_only();
        assert!(!key.can_read());

        let bytes = key.to_bytes();
        assert_eq!(bytes.len(), SECRET_SIZE);
        let decoded = ThreadKey::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.service(), key.service());
        assert!(decoded.read().is_none());
    }

    #[test]
    fn test_rejects_odd_lengths() {
        assert!(ThreadKey::from_bytes(&[]).is_err());
        assert!(ThreadKey::from_bytes(&[0u8; 40]).is_err());
    }
}
