//! Thread and Log value types
//!
//! Identifiers cross every boundary (wire, KeyBook, logs) by value: two ids
//! are equal iff their canonical bytes are equal.

mod addr;
mod id;
mod info;
mod key;
mod peer;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use addr::Addr;
pub use id::{ThreadId, Variant, DEFAULT_THREAD_ID_SIZE, THREAD_ID_VERSION};
pub use info::{LogInfo, ThreadInfo};
pub use key::ThreadKey;
pub use peer::{LogId, PeerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("invalid thread id: {0}")]
    Thread(String),
    #[error("invalid peer id: {0}")]
    Peer(String),
    #[error("invalid address: {0}")]
    Addr(String),
}

/// Bearer credential issued by the token handshake
///
/// Opaque to the client and valid until the remote service says otherwise.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadToken(String);

impl ThreadToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThreadToken(..)")
    }
}

impl From<String> for ThreadToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}
