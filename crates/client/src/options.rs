use common::crypto::{PublicKey, SecretKey};
use common::thread::{LogId, ThreadKey, ThreadToken};

/// Key for the local peer's Log in a Thread
///
/// Handing over only the public key keeps the private half with the
/// caller, who then signs records locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogKey {
    Public(PublicKey),
    Private(SecretKey),
}

impl LogKey {
    pub fn public(&self) -> PublicKey {
        match self {
            LogKey::Public(key) => *key,
            LogKey::Private(key) => key.public(),
        }
    }

    pub fn log_id(&self) -> LogId {
        LogId::from_public_key(&self.public())
    }

    pub fn private(&self) -> Option<&SecretKey> {
        match self {
            LogKey::Public(_) => None,
            LogKey::Private(key) => Some(key),
        }
    }
}

impl From<PublicKey> for LogKey {
    fn from(key: PublicKey) -> Self {
        LogKey::Public(key)
    }
}

impl From<SecretKey> for LogKey {
    fn from(key: SecretKey) -> Self {
        LogKey::Private(key)
    }
}

/// Options for creating or joining a Thread
///
/// Omitted keys are generated by whoever handles the request.
#[derive(Debug, Clone, Default)]
pub struct NewThreadOptions {
    pub thread_key: Option<ThreadKey>,
    pub log_key: Option<LogKey>,
    /// Overrides the bearer token for this call
    pub token: Option<ThreadToken>,
}

impl NewThreadOptions {
    pub fn with_thread_key(mut self, key: ThreadKey) -> Self {
        self.thread_key = Some(key);
        self
    }

    pub fn with_log_key(mut self, key: impl Into<LogKey>) -> Self {
        self.log_key = Some(key.into());
        self
    }

    pub fn with_token(mut self, token: ThreadToken) -> Self {
        self.token = Some(token);
        self
    }
}
