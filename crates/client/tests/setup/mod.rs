//! Shared fixtures for client integration tests

#![allow(dead_code)]

use client::testkit::{MemoryHost, MemoryNetwork};
use client::Client;
use common::prelude::*;

/// One network, one host, one client pointed at it
pub fn setup() -> (MemoryNetwork, MemoryHost, Client) {
    let net = MemoryNetwork::new();
    let host = net.add_host("host1").unwrap();
    let client = net.client(&host);
    (net, host, client)
}

pub fn thread_id() -> ThreadId {
    ThreadId::random(Variant::Raw, 32)
}

pub fn body(text: &str) -> Block {
    Block::encode(&text).unwrap()
}

/// Decrypt `record` and return its body as text
pub fn text(record: &Record, key: &ThreadKey) -> String {
    record
        .event()
        .decode_body(key.read().unwrap())
        .unwrap()
}
