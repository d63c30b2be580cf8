/// In-process hosts for multi-host integration tests
///
/// A [`MemoryNetwork`] implements [`Transport`](crate::transport::Transport)
/// by serving every call from hosts kept in memory, so clients can be
/// exercised end to end without a running service. Hosts are addressed as
/// `memory://<name>` and reach each other through `/memory/<name>` addresses.
///
/// # Example
///
/// ```rust,ignore
/// use client::testkit::MemoryNetwork;
///
/// #[tokio::test]
/// async fn test_replicate() -> anyhow::Result<()> {
///     let net = MemoryNetwork::new();
///     let alice = net.add_host("alice")?;
///     let bob = net.add_host("bob")?;
///
///     // Alice creates a thread and writes to it
///     let client = net.client(&alice);
///     let id = ThreadId::random(Variant::Raw, 32);
///     client.create_thread(&id, Default::default(), None).await?;
///     let record = client.create_record(&id, &Block::encode(&"hi")?, None).await?;
///
///     // Bob replicates it
///     client.add_replicator(&id, &bob.addr(), None).await?;
///     assert!(bob.has_record(&id, record.record.unwrap().cid()));
///     Ok(())
/// }
/// ```
mod host;
mod network;

pub use host::PROTOCOL;
pub use network::{MemoryHost, MemoryNetwork};
