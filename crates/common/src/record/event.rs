use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::crypto::Secret;
use crate::linked_data::{Block, Cid};

use super::RecordError;

#[derive(Debug, Serialize, Deserialize)]
struct HeaderNode {
    #[serde(with = "serde_bytes")]
    key: Vec<u8>,
    time: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventNode {
    header: Cid,
    body: Cid,
}

/// Decrypted contents of an event header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Key the body node is sealed with
    pub key: Secret,
    pub time: DateTime<Utc>,
}

/// The payload unit of a record: a plaintext node linking an encrypted header
/// and an encrypted body
///
/// Reading the body is a two-stage decryption: the Thread read key opens the
/// header, and the key found in the header opens the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    node: Block,
    header: Block,
    body: Block,
}

impl Event {
    /// Seal `body` under a fresh key and seal that key under `read_key`
    pub fn create(body: &Block, read_key: &Secret) -> Result<Self, RecordError> {
        let body_key = Secret::generate();
        let body = Block::seal(body.data(), &body_key)?;

        let header = HeaderNode {
            key: body_key.bytes().to_vec(),
            time: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        };
        let header = Block::seal(Block::encode(&header)?.data(), read_key)?;

        let node = Block::encode(&EventNode {
            header: *header.cid(),
            body: *body.cid(),
        })?;

        Ok(Self { node, header, body })
    }

    /// Reassemble an event, checking that the node links the given header and body
    pub fn from_nodes(node: Block, header: Block, body: Block) -> Result<Self, RecordError> {
        let links: EventNode = node.decode()?;
        if links.header != *header.cid() {
            return Err(RecordError::Link(format!(
                "event links header {} but carries {}",
                links.header,
                header.cid()
            )));
        }
        if links.body != *body.cid() {
            return Err(RecordError::Link(format!(
                "event links body {} but carries {}",
                links.body,
                body.cid()
            )));
        }
        Ok(Self { node, header, body })
    }

    pub fn cid(&self) -> &Cid {
        self.node.cid()
    }

    pub fn node(&self) -> &Block {
        &self.node
    }

    pub fn header_node(&self) -> &Block {
        &self.header
    }

    pub fn body_node(&self) -> &Block {
        &self.body
    }

    /// Open the header with the Thread read key
    pub fn header(&self, read_key: &Secret) -> Result<Header, RecordError> {
        let node: HeaderNode = Block::from_bytes(self.header.open(read_key)?).decode()?;
        Ok(Header {
            key: Secret::from_slice(&node.key)?,
            time: Utc.timestamp_nanos(node.time),
        })
    }

    /// The application block carried by this event
    pub fn body(&self, read_key: &Secret) -> Result<Block, RecordError> {
        let header = self.header(read_key)?;
        Ok(Block::from_bytes(self.body.open(&header.key)?))
    }

    /// Shorthand for decoding [`Event::body`]
    pub fn decode_body<T: DeserializeOwned>(&self, read_key: &Secret) -> Result<T, RecordError> {
        Ok(self.body(read_key)?.decode()?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn body() -> Block {
        let mut map = BTreeMap::new();
        map.insert("foo", "bar");
        Block::encode(&map).unwrap()
    }

    #[test]
    fn test_body_needs_read_key() {
        let read_key = Secret::generate();
        let original = body();
        let event = Event::create(&original, &read_key).unwrap();

        let opened = event.body(&read_key).unwrap();
        assert_eq!(opened.cid(), original.cid());
        assert!(event.body(&Secret::generate()).is_err());
        // header key is not the read key
        assert!(event.body_node().open(&read_key).is_err());
    }

    #[test]
    fn test_from_nodes_checks_links() {
        let read_key = Secret::generate();
        let event = Event::create(&body(), &read_key).unwrap();
        let other = Event::create(&body(), &read_key).unwrap();

        assert!(Event::from_nodes(
            event.node().clone(),
            event.header_node().clone(),
            event.body_node().clone()
        )
        .is_ok());
        assert!(matches!(
            Event::from_nodes(
                event.node().clone(),
                other.header_node().clone(),
                event.body_node().clone()
            ),
            Err(RecordError::Link(_))
        ));
    }
}
