//! Integration tests for the KeyBook-backed Network

mod setup;

use client::prelude::*;

fn network(client: Client) -> Network<MemoryDatastore> {
    Network::new(client, KeyBook::new(MemoryDatastore::new()))
}

#[tokio::test]
async fn test_host_never_sees_read_key() {
    let (_net, host, client) = setup::setup();
    let net = network(client);
    let id = setup::thread_id();

    let info = net
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
    assert!(info.key.as_ref().unwrap().can_read());
    assert!(info.owned_log().is_some());

    let remote = host.thread(&id).unwrap();
    assert!(!remote.key.as_ref().unwrap().can_read());
    assert!(remote.owned_log().is_none());

    let local = net.keys().thread_keys(&id).await.unwrap().unwrap();
    assert_eq!(info.key.as_ref(), Some(&local));
}

#[tokio::test]
async fn test_records_built_locally() {
    let (_net, host, client) = setup::setup();
    let net = network(client);
    let id = setup::thread_id();
    let info = net
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
    let key = info.key.clone().unwrap();
    let log = info.owned_log().unwrap().id.clone();

    let first = net
        .create_record(&id, &setup::body("one"), None)
        .await
        .unwrap();
    let second = net
        .create_record(&id, &setup::body("two"), None)
        .await
        .unwrap();
    assert_eq!(first.log_id, log);
    let first = first.record.unwrap();
    let second = second.record.unwrap();
    assert_eq!(second.prev(), Some(first.cid()));
    assert!(host.has_record(&id, second.cid()));

    let fetched = net.get_record(&id, second.cid(), None).await.unwrap();
    assert_eq!(setup::text(&fetched, &key), "two");

    // the plain client cannot read it: the host has no read key
    assert!(matches!(
        net.client().get_record(&id, first.cid(), None).await,
        Err(Error::MissingKey(_))
    ));
}

#[tokio::test]
async fn test_record_without_local_keys() {
    let (_net, _host, client) = setup::setup();
    let net = network(client.clone());
    let id = setup::thread_id();
    client
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();

    assert!(matches!(
        net.create_record(&id, &setup::body("x"), None).await,
        Err(Error::MissingKey(_))
    ));
}

#[tokio::test]
async fn test_get_record_falls_back_to_host_key() {
    let (_net, _host, client) = setup::setup();
    let net = network(client.clone());
    let id = setup::thread_id();
    client
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
    let record = client
        .create_record(&id, &setup::body("remote"), None)
        .await
        .unwrap()
        .record
        .unwrap();

    let fetched = net.get_record(&id, record.cid(), None).await.unwrap();
    assert_eq!(fetched.cid(), record.cid());
}

#[tokio::test]
async fn test_subscription_uses_local_keys() {
    let (_net, host, client) = setup::setup();
    let net = network(client);
    let id = setup::thread_id();
    let key = net
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap()
        .key
        .unwrap();

    let mut sub = net.subscribe(&[id.clone()], None).await.unwrap();
    let before = host.calls("GetThread");
    net.create_record(&id, &setup::body("mine"), None)
        .await
        .unwrap();

    match sub.next().await {
        Some(SubscriptionEvent::Delivered(record)) => {
            assert_eq!(setup::text(record.record.as_ref().unwrap(), &key), "mine")
        }
        other => panic!("unexpected {:?}", other),
    }
    // only create_record looked the thread up
    assert_eq!(host.calls("GetThread") - before, 1);
}

#[tokio::test]
async fn test_delete_clears_local_keys() {
    let (_net, _host, client) = setup::setup();
    let net = network(client);
    let id = setup::thread_id();
    net.create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
    assert!(net.keys().threads().await.unwrap().contains(&id));

    net.delete_thread(&id, None).await.unwrap();
    assert!(net.keys().thread_keys(&id).await.unwrap().is_none());
    assert!(net.keys().logs(&id).await.unwrap().is_empty());
    assert!(matches!(
        net.get_thread(&id, None).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_join_requires_thread_key() {
    let (mem, alice, alice_client) = setup::setup();
    let bob = mem.add_host("bob").unwrap();
    let alice_net = network(alice_client);
    let bob_net = network(mem.client(&bob));

    let id = setup::thread_id();
    let info = alice_net
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
    let addr = alice.thread_addr(&id);

    assert!(matches!(
        bob_net
            .add_thread(&addr, NewThreadOptions::default(), None)
            .await,
        Err(Error::MissingKey(_))
    ));

    let joined = bob_net
        .add_thread(
            &addr,
            NewThreadOptions::default().with_thread_key(info.key.clone().unwrap()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(joined.key, info.key);
    assert!(joined.owned_log().is_some());

    // both peers write, each to its own log
    let from_alice = alice_net
        .create_record(&id, &setup::body("a"), None)
        .await
        .unwrap();
    let from_bob = bob_net
        .create_record(&id, &setup::body("b"), None)
        .await
        .unwrap();
    assert_ne!(from_alice.log_id, from_bob.log_id);
    let bob_record = from_bob.record.unwrap();
    let seen = alice_net
        .get_record(&id, bob_record.cid(), None)
        .await
        .unwrap();
    assert_eq!(setup::text(&seen, info.key.as_ref().unwrap()), "b");
}

#[tokio::test]
async fn test_supplied_public_log_key_cannot_write() {
    let (_net, _host, client) = setup::setup();
    let net = network(client);
    let id = setup::thread_id();
    let writer = SecretKey::generate();
    net.create_thread(
        &id,
        NewThreadOptions::default().with_log_key(LogKey::Public(writer.public())),
        None,
    )
    .await
    .unwrap();

    assert!(matches!(
        net.create_record(&id, &setup::body("x"), None).await,
        Err(Error::MissingKey(_))
    ));
}

#[tokio::test]
async fn test_keys_survive_in_sqlite() {
    let (_net, _host, client) = setup::setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.sqlite");
    let id = setup::thread_id();

    let store = SqliteDatastore::open(&path).await.unwrap();
    let net = Network::new(client.clone(), KeyBook::new(store));
    let info = net
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
    net.close().await.unwrap();

    let store = SqliteDatastore::open(&path).await.unwrap();
    let net = Network::new(client, KeyBook::new(store));
    assert_eq!(net.keys().thread_keys(&id).await.unwrap(), info.key);
    let record = net
        .create_record(&id, &setup::body("persisted"), None)
        .await
        .unwrap();
    assert_eq!(record.log_id, info.owned_log().unwrap().id);
}

#[tokio::test]
async fn test_replicator_and_pull() {
    let (mem, alice, client) = setup::setup();
    let bob = mem.add_host("bob").unwrap();
    let net = network(client);
    let id = setup::thread_id();
    net.create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();

    let peer = net.add_replicator(&id, &bob.addr(), None).await.unwrap();
    assert_eq!(peer, bob.peer_id());

    alice.push_records(false);
    let record = net
        .create_record(&id, &setup::body("queued"), None)
        .await
        .unwrap()
        .record
        .unwrap();
    assert!(!bob.has_record(&id, record.cid()));

    net.pull_thread(&id, Some(&bob.context())).await.unwrap();
    assert!(bob.has_record(&id, record.cid()));

    match net.pull_thread(&setup::thread_id(), None).await {
        Err(Error::NotFound(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}
