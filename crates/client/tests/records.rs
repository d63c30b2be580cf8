//! Integration tests for record creation and retrieval

mod setup;

use client::prelude::*;
use client::transport::Code;

#[tokio::test]
async fn test_create_and_get_record() {
    let (_net, _host, client) = setup::setup();
    let id = setup::thread_id();
    let info = client
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
    let key = info.key.unwrap();

    let created = client
        .create_record(&id, &setup::body("hello"), None)
        .await
        .unwrap();
    assert_eq!(created.thread_id, id);
    assert_eq!(created.log_id, info.logs.keys().next().unwrap().clone());
    let record = created.record.unwrap();
    assert_eq!(record.prev(), None);
    assert_eq!(setup::text(&record, &key), "hello");

    let fetched = client.get_record(&id, record.cid(), None).await.unwrap();
    assert_eq!(fetched.cid(), record.cid());
    assert_eq!(setup::text(&fetched, &key), "hello");
}

#[tokio::test]
async fn test_records_chain_and_head_moves() {
    let (_net, _host, client) = setup::setup();
    let id = setup::thread_id();
    client
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();

    let first = client
        .create_record(&id, &setup::body("one"), None)
        .await
        .unwrap()
        .record
        .unwrap();
    let second = client
        .create_record(&id, &setup::body("two"), None)
        .await
        .unwrap()
        .record
        .unwrap();
    assert_eq!(second.prev(), Some(first.cid()));

    let info = client.get_thread(&id, None).await.unwrap();
    let log = info.owned_log().unwrap();
    assert_eq!(log.head.as_ref(), Some(second.cid()));
}

#[tokio::test]
async fn test_add_record_signed_locally() {
    let (_net, host, client) = setup::setup();
    let id = setup::thread_id();
    let thread_key = ThreadKey::generate(true);
    let log_key = SecretKey::generate();
    client
        .create_thread(
            &id,
            NewThreadOptions::default()
                .with_thread_key(thread_key.service_only())
                .with_log_key(LogKey::Public(log_key.public())),
            None,
        )
        .await
        .unwrap();

    let event = Event::create(&setup::body("local"), thread_key.read().unwrap()).unwrap();
    let record = Record::create(event, &log_key, None, thread_key.service()).unwrap();
    let log = LogId::from_secret_key(&log_key);
    client.add_record(&id, &log, &record, None).await.unwrap();
    assert!(host.has_record(&id, record.cid()));

    // the host holds no read key, so get_record cannot decode on its own
    assert!(matches!(
        client.get_record(&id, record.cid(), None).await,
        Err(Error::MissingKey(_))
    ));
    let fetched = client
        .get_record_with_key(&id, record.cid(), &thread_key, None)
        .await
        .unwrap();
    assert_eq!(setup::text(&fetched, &thread_key), "local");
}

#[tokio::test]
async fn test_add_record_out_of_order_rejected() {
    let (_net, _host, client) = setup::setup();
    let id = setup::thread_id();
    let thread_key = ThreadKey::generate(true);
    let log_key = SecretKey::generate();
    client
        .create_thread(
            &id,
            NewThreadOptions::default()
                .with_thread_key(thread_key.clone())
                .with_log_key(LogKey::Public(log_key.public())),
            None,
        )
        .await
        .unwrap();

    let event = Event::create(&setup::body("dangling"), thread_key.read().unwrap()).unwrap();
    let bogus_prev = common::linked_data::cid_for(b"nowhere");
    let record = Record::create(event, &log_key, Some(bogus_prev), thread_key.service()).unwrap();
    let result = client
        .add_record(&id, &LogId::from_secret_key(&log_key), &record, None)
        .await;
    match result {
        Err(Error::Remote(status)) => assert_eq!(status.code, Code::FailedPrecondition),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_record_is_missing_value() {
    let (_net, _host, client) = setup::setup();
    let id = setup::thread_id();
    client
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();

    let absent = common::linked_data::cid_for(b"absent");
    assert!(matches!(
        client.get_record(&id, &absent, None).await,
        Err(Error::MissingValue(_))
    ));
}

#[tokio::test]
async fn test_record_without_read_key_on_host() {
    let (_net, _host, client) = setup::setup();
    let id = setup::thread_id();
    client
        .create_thread(
            &id,
            NewThreadOptions::default().with_thread_key(ThreadKey::generate(false)),
            None,
        )
        .await
        .unwrap();

    match client.create_record(&id, &setup::body("x"), None).await {
        Err(Error::Remote(status)) => assert_eq!(status.code, Code::FailedPrecondition),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_record_in_unknown_thread() {
    let (_net, _host, client) = setup::setup();
    assert!(matches!(
        client
            .create_record(&setup::thread_id(), &setup::body("x"), None)
            .await,
        Err(Error::NotFound(_))
    ));
}
