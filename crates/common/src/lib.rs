/**
 * Cryptographic types and operations.
 *  - Ed25519 keypairs for Logs and identities
 *  - Symmetric secrets for Thread and record keys
 */
pub mod crypto;
/**
 * Key-value storage engines the KeyBook
 *  persists into: in memory and SQLite.
 */
pub mod datastore;
/**
 * The signer behind the token handshake.
 */
pub mod identity;
/**
 * Durable custody of Thread and Log keys,
 *  namespaced per Thread.
 */
pub mod keybook;
/**
 * Content-addressed DAG-CBOR blocks,
 *  plain or sealed under a secret.
 */
pub mod linked_data;
/**
 * Encrypted, signed, hash-linked records
 *  and the envelope they travel in.
 */
pub mod record;
/**
 * Thread and Log identifiers, keys, addresses
 *  and the info snapshots built from them.
 */
pub mod thread;

pub mod prelude {
    pub use crate::crypto::{PublicKey, Secret, SecretKey};
    pub use crate::datastore::{Datastore, MemoryDatastore, SqliteDatastore};
    pub use crate::identity::Identity;
    pub use crate::keybook::{KeyBook, KeyBookError};
    pub use crate::linked_data::{multibase, Block, Cid, Ipld};
    pub use crate::record::{Event, Record, RecordEnvelope, ThreadRecord};
    pub use crate::thread::{
        Addr, LogId, LogInfo, PeerId, ThreadId, ThreadInfo, ThreadKey, ThreadToken, Variant,
    };
}
