//! Live delivery of new records
//!
//! A subscription is a task that reads frames from one server stream,
//! resolves the key of each Thread the first time it shows up, decodes the
//! record and forwards the outcome over a channel. Frames are handled one at
//! a time, so events come out in the order the service sent them.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::task::AbortHandle;

use common::record::{Record, ThreadRecord};
use common::thread::{LogId, ThreadId, ThreadKey};

use crate::error::Error;
use crate::messages::{decode, NewRecordReply};
use crate::transport::{Frame, FrameStream};

/// Buffered events before the task waits on the consumer
const EVENT_BUFFER: usize = 16;

#[derive(Debug)]
pub enum SubscriptionEvent {
    Delivered(ThreadRecord),
    /// One message could not be delivered; the stream continues
    Failed(Error),
    /// Last event of the stream: `None` after a graceful end, the failure
    /// otherwise
    Closed(Option<Error>),
}

/// Where a subscription finds the keys of a Thread
#[async_trait]
pub trait KeyResolver: Send + Sync + 'static {
    /// `Ok(None)` when nothing usable is known for `thread`
    async fn resolve(&self, thread: &ThreadId) -> Result<Option<ThreadKey>, Error>;
}

/// Stops a subscription from anywhere
#[derive(Debug, Clone)]
pub struct Closer {
    closed: Arc<AtomicBool>,
    task: AbortHandle,
}

impl Closer {
    /// Stop delivery and drop the stream. Safe to call repeatedly.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("closing subscription");
            self.task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Handle on a running subscription
///
/// Yields events until the terminal [`SubscriptionEvent::Closed`], or until
/// closed. Once closed it yields nothing more, not even a terminal event.
/// Dropping the handle closes it.
pub struct Subscription {
    events: BoxStream<'static, SubscriptionEvent>,
    closer: Closer,
    done: bool,
}

impl Subscription {
    pub(crate) fn spawn(frames: FrameStream, resolver: Arc<dyn KeyResolver>) -> Self {
        let (tx, rx) = flume::bounded(EVENT_BUFFER);
        let task = tokio::spawn(run(frames, resolver, tx));
        Self {
            events: rx.into_stream().boxed(),
            closer: Closer {
                closed: Arc::new(AtomicBool::new(false)),
                task: task.abort_handle(),
            },
            done: false,
        }
    }

    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        StreamExt::next(self).await
    }

    pub fn close(&self) {
        self.closer.close();
    }

    pub fn closer(&self) -> Closer {
        self.closer.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.closer.is_closed())
            .field("done", &self.done)
            .finish()
    }
}

impl Stream for Subscription {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        if self.done || self.closer.is_closed() {
            return Poll::Ready(None);
        }
        match self.events.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                // an event already buffered when close was called is dropped
                if self.closer.is_closed() {
                    self.done = true;
                    return Poll::Ready(None);
                }
                if matches!(event, SubscriptionEvent::Closed(_)) {
                    self.done = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closer.close();
    }
}

async fn run(
    frames: FrameStream,
    resolver: Arc<dyn KeyResolver>,
    events: flume::Sender<SubscriptionEvent>,
) {
    let mut keys = ThreadKeys::new(resolver);
    loop {
        let frame = frames
            .recv_async()
            .await
            .unwrap_or_else(|_| Frame::Broken("stream dropped".into()));

        let event = match frame {
            Frame::Message(bytes) => match keys.deliver(&bytes).await {
                Ok(record) => SubscriptionEvent::Delivered(record),
                Err(e) => {
                    tracing::warn!("failed to deliver subscription message: {}", e);
                    SubscriptionEvent::Failed(e)
                }
            },
            Frame::End(status) if status.is_ok() => {
                tracing::debug!("subscription ended");
                let _ = events.send_async(SubscriptionEvent::Closed(None)).await;
                return;
            }
            Frame::End(status) => {
                tracing::debug!("subscription ended with {}", status);
                let error = Error::from_status(status);
                let _ = events.send_async(SubscriptionEvent::Closed(Some(error))).await;
                return;
            }
            Frame::Broken(msg) => {
                tracing::debug!("subscription broken: {}", msg);
                let error = Error::Transport(msg);
                let _ = events.send_async(SubscriptionEvent::Closed(Some(error))).await;
                return;
            }
        };

        if events.send_async(event).await.is_err() {
            return;
        }
    }
}

/// Per-subscription key cache
///
/// Each Thread is resolved at most once for the life of the subscription.
/// A Thread with no usable key stays keyless until the next subscription;
/// only resolver errors are retried.
struct ThreadKeys {
    resolver: Arc<dyn KeyResolver>,
    cache: BTreeMap<ThreadId, Option<ThreadKey>>,
}

impl ThreadKeys {
    fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            cache: BTreeMap::new(),
        }
    }

    async fn key(&mut self, thread: &ThreadId) -> Result<ThreadKey, Error> {
        let key = match self.cache.get(thread) {
            Some(key) => key.clone(),
            None => {
                tracing::debug!("resolving key for thread {}", thread);
                let key = self.resolver.resolve(thread).await?;
                self.cache.insert(thread.clone(), key.clone());
                key
            }
        };
        key.ok_or_else(|| Error::MissingKey(thread.clone()))
    }

    async fn deliver(&mut self, bytes: &[u8]) -> Result<ThreadRecord, Error> {
        let message: NewRecordReply = decode(bytes)?;
        let thread_id = ThreadId::from_bytes(&message.thread_id)?;
        let log_id = LogId::from_bytes(&message.log_id)?;
        tracing::debug!("subscription record on {} / {}", thread_id, log_id);

        let key = self.key(&thread_id).await?;
        let record = Record::from_envelope(&message.record, key.service())?;
        if record.log_id() != log_id {
            return Err(Error::Decode(format!(
                "record written by {} delivered for log {}",
                record.log_id(),
                log_id
            )));
        }

        Ok(ThreadRecord {
            record: Some(record),
            thread_id,
            log_id,
        })
    }
}
