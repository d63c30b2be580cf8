//! Integration tests for the token handshake

mod setup;

use client::prelude::*;

#[tokio::test]
async fn test_get_token_binds_context() {
    let (_net, host, client) = setup::setup();
    host.require_token(true);
    let identity = SecretKey::generate();

    let token = client.get_token(&identity, None).await.unwrap();
    assert!(!token.is_empty());
    assert_eq!(client.context().token, Some(token));
    assert_eq!(host.calls("GetToken"), 1);

    // the bound token is accepted by calls that require one
    let id = setup::thread_id();
    client
        .create_thread(&id, NewThreadOptions::default(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wrong_signature_is_auth_error() {
    let (_net, _host, client) = setup::setup();
    let identity = SecretKey::generate();

    let result = client
        .get_token_challenge(
            &identity.public(),
            |_challenge| async move { Ok(identity.sign(b"not the challenge")) },
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::Auth(_))));
    assert_eq!(client.context().token, None);
}

#[tokio::test]
async fn test_signer_failure_is_auth_error() {
    let (_net, _host, client) = setup::setup();
    let identity = SecretKey::generate();

    let result = client
        .get_token_challenge(
            &identity.public(),
            |_challenge| async {
                Err(common::identity::IdentityError::Signer("locked".into()))
            },
            None,
        )
        .await;
    match result {
        Err(Error::Auth(msg)) => assert!(msg.contains("locked")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let (_net, host, client) = setup::setup();
    host.require_token(true);

    let result = client
        .create_thread(&setup::thread_id(), NewThreadOptions::default(), None)
        .await;
    assert!(matches!(result, Err(Error::Auth(_))));
}

#[tokio::test]
async fn test_per_call_token_overrides_default() {
    let (net, host, client) = setup::setup();
    host.require_token(true);

    let other = net.client(&host);
    let token = other.get_token(&SecretKey::generate(), None).await.unwrap();

    let id = setup::thread_id();
    client
        .create_thread(&id, NewThreadOptions::default().with_token(token.clone()), None)
        .await
        .unwrap();

    let ctx = Context::new().with_token(token);
    client.get_thread(&id, Some(&ctx)).await.unwrap();
    assert!(matches!(
        client.get_thread(&id, None).await,
        Err(Error::Auth(_))
    ));
}
