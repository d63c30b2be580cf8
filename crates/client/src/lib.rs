/**
 * The Network Client: token handshake, Thread,
 *  Log and Record lifecycle, subscriptions.
 */
mod client;
/**
 * Calling context merged into every request.
 */
pub mod context;
pub mod error;
/**
 * Wire messages and their conversions
 *  to and from the typed model.
 */
pub mod messages;
/**
 * Client paired with a local KeyBook.
 */
mod network;
mod options;
pub mod subscription;
/**
 * Challenge-response state machine.
 */
pub mod token;
/**
 * Call shapes, the HTTP realization
 *  and its frame codec.
 */
pub mod transport;

/**
 * In-process stand-in for the service,
 *  for tests and demos.
 */
#[cfg(feature = "testkit")]
pub mod testkit;

pub use client::Client;
pub use context::Context;
pub use error::Error;
pub use network::Network;
pub use options::{LogKey, NewThreadOptions};
pub use subscription::{Closer, KeyResolver, Subscription, SubscriptionEvent};

pub mod prelude {
    pub use crate::{
        Client, Context, Error, LogKey, Network, NewThreadOptions, Subscription,
        SubscriptionEvent,
    };
    pub use common::prelude::*;
}
