use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, Secret, SecretKey, Signature};
use crate::identity::Identity;
use crate::linked_data::{Block, Cid};
use crate::thread::{LogId, LogInfo};

use super::{Event, RecordEnvelope, RecordError};

#[derive(Debug, Serialize, Deserialize)]
struct RecordNode {
    block: Cid,
    prev: Option<Cid>,
    #[serde(with = "serde_bytes")]
    sig: Vec<u8>,
    #[serde(rename = "pubKey", with = "serde_bytes")]
    pub_key: Vec<u8>,
}

/// The bytes a Log owner signs
#[derive(Serialize)]
struct SignedLinks<'a> {
    block: &'a Cid,
    prev: &'a Option<Cid>,
}

fn signed_payload(block: &Cid, prev: &Option<Cid>) -> Result<Vec<u8>, RecordError> {
    Ok(Block::encode(&SignedLinks { block, prev })?.into_data())
}

/// One signed entry of a Log
///
/// The record node links an [`Event`] and the previous record of the same
/// Log, and is sealed with the Thread service key. Holding the service key is
/// enough to decode, verify and relay a record; reading its body additionally
/// needs the read key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    node: Block,
    prev: Option<Cid>,
    sig: Signature,
    pub_key: PublicKey,
    event: Event,
}

impl Record {
    /// Sign `event` as the next entry after `prev` in the Log owned by `log_key`
    pub fn create(
        event: Event,
        log_key: &SecretKey,
        prev: Option<Cid>,
        service_key: &Secret,
    ) -> Result<Self, RecordError> {
        let payload = signed_payload(event.cid(), &prev)?;
        let sig = log_key.sign(&payload);
        Self::assemble(event, log_key.public(), sig, prev, service_key)
    }

    /// Like [`Record::create`], signing through an [`Identity`]
    pub async fn create_with(
        event: Event,
        identity: &dyn Identity,
        prev: Option<Cid>,
        service_key: &Secret,
    ) -> Result<Self, RecordError> {
        let payload = signed_payload(event.cid(), &prev)?;
        let sig = identity
            .sign(&payload)
            .await
            .map_err(|e| RecordError::Signer(e.to_string()))?;
        Self::assemble(event, identity.public(), sig, prev, service_key)
    }

    fn assemble(
        event: Event,
        pub_key: PublicKey,
        sig: Signature,
        prev: Option<Cid>,
        service_key: &Secret,
    ) -> Result<Self, RecordError> {
        let node = RecordNode {
            block: *event.cid(),
            prev,
            sig: sig.to_bytes().to_vec(),
            pub_key: pub_key.marshal(),
        };
        let node = Block::seal(Block::encode(&node)?.data(), service_key)?;

        Ok(Self {
            node,
            prev,
            sig,
            pub_key,
            event,
        })
    }

    /// Decode and verify a record received over the wire
    ///
    /// Fails if the service key does not open the record node, if any link
    /// does not resolve to the node carried in the envelope, or if the
    /// signature does not verify against the embedded public key.
    pub fn from_envelope(
        envelope: &RecordEnvelope,
        service_key: &Secret,
    ) -> Result<Self, RecordError> {
        let node = Block::from_bytes(envelope.record_node.clone());
        let decoded: RecordNode = Block::from_bytes(node.open(service_key)?).decode()?;

        let event_node = Block::from_bytes(envelope.event_node.clone());
        if *event_node.cid() != decoded.block {
            return Err(RecordError::Link(format!(
                "record links event {} but carries {}",
                decoded.block,
                event_node.cid()
            )));
        }
        let event = Event::from_nodes(
            event_node,
            Block::from_bytes(envelope.header_node.clone()),
            Block::from_bytes(envelope.body_node.clone()),
        )?;

        let sig = Signature::from_slice(&decoded.sig).map_err(|_| RecordError::Signature)?;
        let pub_key = PublicKey::unmarshal(&decoded.pub_key)?;

        let record = Self {
            node,
            prev: decoded.prev,
            sig,
            pub_key,
            event,
        };
        record.verify()?;
        Ok(record)
    }

    pub fn to_envelope(&self) -> RecordEnvelope {
        RecordEnvelope {
            record_node: self.node.data().to_vec(),
            event_node: self.event.node().data().to_vec(),
            header_node: self.event.header_node().data().to_vec(),
            body_node: self.event.body_node().data().to_vec(),
        }
    }

    /// Content address of the (sealed) record node
    pub fn cid(&self) -> &Cid {
        self.node.cid()
    }

    pub fn prev(&self) -> Option<&Cid> {
        self.prev.as_ref()
    }

    pub fn pub_key(&self) -> &PublicKey {
        &self.pub_key
    }

    /// The Log this record was written to
    pub fn log_id(&self) -> LogId {
        LogId::from_public_key(&self.pub_key)
    }

    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Check the signature against the embedded public key
    pub fn verify(&self) -> Result<(), RecordError> {
        let payload = signed_payload(self.event.cid(), &self.prev)?;
        self.pub_key
            .verify(&payload, &self.sig)
            .map_err(|_| RecordError::Signature)
    }

    /// Check that this record is a valid next entry for `log`
    pub fn verify_chain(&self, log: &LogInfo) -> Result<(), RecordError> {
        if self.pub_key != log.pub_key {
            return Err(RecordError::WrongWriter {
                expected: log.id.clone(),
                actual: self.log_id(),
            });
        }
        self.verify()?;
        if self.prev != log.head {
            return Err(RecordError::Chain {
                expected: log.head,
                actual: self.prev,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadKey;

    fn event(key: &ThreadKey) -> Event {
        let body = Block::encode(&vec!["hello", "threads"]).unwrap();
        Event::create(&body, key.read().unwrap()).unwrap()
    }

    #[test]
    fn test_envelope_needs_service_key() {
        let key = ThreadKey::generate(true);
        let writer = SecretKey::generate();
        let record = Record::create(event(&key), &writer, None, key.service()).unwrap();

        let envelope = record.to_envelope();
        let decoded = Record::from_envelope(&envelope, key.service()).unwrap();
        assert_eq!(decoded.cid(), record.cid());
        assert_eq!(decoded.log_id(), LogId::from_secret_key(&writer));
        assert!(decoded.prev().is_none());

        let body: Vec<String> = decoded.event().decode_body(key.read().unwrap()).unwrap();
        assert_eq!(body, vec!["hello", "threads"]);

        // the read key does not open the record node
        assert!(Record::from_envelope(&envelope, key.read().unwrap()).is_err());
    }

    #[test]
    fn test_service_only_peer_cannot_read() {
        let key = ThreadKey::generate(true);
        let writer = SecretKey::generate();
        let record = Record::create(event(&key), &writer, None, key.service()).unwrap();

        let relay = key.service_only();
        let decoded = Record::from_envelope(&record.to_envelope(), relay.service()).unwrap();
        assert!(decoded.verify().is_ok());
        assert!(decoded.event().body(relay.service()).is_err());
    }

    #[test]
    fn test_swapped_nodes_are_rejected() {
        let key = ThreadKey::generate(true);
        let writer = SecretKey::generate();
        let first = Record::create(event(&key), &writer, None, key.service()).unwrap();
        let second = Record::create(event(&key), &writer, None, key.service()).unwrap();

        let mut envelope = first.to_envelope();
        envelope.event_node = second.to_envelope().event_node;
        assert!(matches!(
            Record::from_envelope(&envelope, key.service()),
            Err(RecordError::Link(_))
        ));

        let mut envelope = first.to_envelope();
        envelope.body_node = second.to_envelope().body_node;
        assert!(matches!(
            Record::from_envelope(&envelope, key.service()),
            Err(RecordError::Link(_))
        ));
    }

    #[test]
    fn test_verify_chain() {
        let key = ThreadKey::generate(true);
        let writer = SecretKey::generate();
        let mut log = LogInfo::owned(writer.clone());

        let first = Record::create(event(&key), &writer, None, key.service()).unwrap();
        first.verify_chain(&log).unwrap();
        log.head = Some(*first.cid());

        // a second genesis no longer extends the head
        let fork = Record::create(event(&key), &writer, None, key.service()).unwrap();
        assert!(matches!(
            fork.verify_chain(&log),
            Err(RecordError::Chain { .. })
        ));

        let second =
            Record::create(event(&key), &writer, Some(*first.cid()), key.service()).unwrap();
        second.verify_chain(&log).unwrap();
        assert_eq!(second.prev(), Some(first.cid()));

        let stranger = SecretKey::generate();
        let foreign =
            Record::create(event(&key), &stranger, Some(*first.cid()), key.service()).unwrap();
        assert!(matches!(
            foreign.verify_chain(&log),
            Err(RecordError::WrongWriter { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_with_identity() {
        let key = ThreadKey::generate(true);
        let writer = SecretKey::generate();
        let record = Record::create_with(event(&key), &writer, None, key.service())
            .await
            .unwrap();

        let decoded = Record::from_envelope(&record.to_envelope(), key.service()).unwrap();
        assert_eq!(decoded.pub_key(), &writer.public());
    }
}
