use std::fmt;
use std::str::FromStr;

use super::IdError;

/// Network address of a host, peer or Thread
///
/// Addresses are opaque to the client: a textual multiaddr
/// (`/dns4/host/tcp/4006/p2p/<peer>/thread/<thread>`) carried as bytes. The
/// only structure relied on is the `/protocol/value` pairing.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(String);

impl Addr {
    pub fn new(addr: impl Into<String>) -> Result<Self, IdError> {
        let addr = addr.into();
        if !addr.starts_with('/') || addr.len() < 2 {
            return Err(IdError::Addr(format!("{:?} is not a multiaddr", addr)));
        }
        Ok(Self(addr.trim_end_matches('/').to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        let text = std::str::from_utf8(bytes).map_err(|e| IdError::Addr(e.to_string()))?;
        Self::new(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    /// Append `inner` to this address
    pub fn encapsulate(&self, inner: &Addr) -> Addr {
        Addr(format!("{}{}", self.0, inner.0))
    }

    /// The value following the last occurrence of `protocol`
    pub fn value_for(&self, protocol: &str) -> Option<&str> {
        let parts: Vec<&str> = self.0.split('/').skip(1).collect();
        parts
            .windows(2)
            .rev()
            .find(|pair| pair[0] == protocol)
            .map(|pair| pair[1])
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addr({})", self.0)
    }
}

impl FromStr for Addr {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
