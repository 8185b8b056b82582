//! Pub/sub backbone seam and the in-process adapter.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

/// Messages received on one backbone channel. Dropping the stream ends the
/// subscription.
pub type BackboneStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Backbone failures. Never fatal to a connection or a subscription.
#[derive(Debug, thiserror::Error)]
pub enum BackboneError {
    /// Could not reach the backbone.
    #[error("backbone connection failed: {0}")]
    Connection(String),

    /// A publish was refused or lost.
    #[error("publish to {channel} failed: {message}")]
    Publish {
        /// Target channel.
        channel: String,
        /// Underlying error text.
        message: String,
    },

    /// A subscription could not be opened.
    #[error("subscribe to {channel} failed: {message}")]
    Subscribe {
        /// Target channel.
        channel: String,
        /// Underlying error text.
        message: String,
    },
}

/// Shared message bus connecting hub instances.
///
/// Delivery within a channel is best-effort; nothing is assumed across
/// channels.
#[async_trait]
pub trait Backbone: Send + Sync {
    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BackboneError>;

    /// Open a subscription on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<BackboneStream, BackboneError>;
}

/// Default per-channel buffer for [`LocalBackbone`].
const DEFAULT_LOCAL_CAPACITY: usize = 1024;

/// In-process backbone built on one `tokio::sync::broadcast` channel per
/// backbone channel. Hub instances in the same process may share one.
pub struct LocalBackbone {
    channels: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
}

impl LocalBackbone {
    /// Create with the default per-channel buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOCAL_CAPACITY)
    }

    /// Create with a custom per-channel buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for LocalBackbone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backbone for LocalBackbone {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BackboneError> {
        let mut channels = self.channels.lock();
        let Some(tx) = channels.get(channel) else {
            debug!(channel, "no subscribers, message dropped");
            return Ok(());
        };
        if tx.send(payload).is_err() {
            // Every receiver is gone.
            let _ = channels.remove(channel);
            debug!(channel, "no subscribers, message dropped");
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BackboneStream, BackboneError> {
        let rx = self
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let item = match item {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "local backbone subscriber lagged");
                    None
                }
            };
            futures::future::ready(item)
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let backbone = LocalBackbone::new();
        let mut stream = backbone.subscribe("c1").await.unwrap();
        backbone.publish("c1", Bytes::from_static(b"hi")).await.unwrap();

        let got = tokio::time::timeout(TIMEOUT, stream.next()).await.unwrap();
        assert_eq!(got, Some(Bytes::from_static(b"hi")));
    }

    #[tokio::test]
    async fn every_subscriber_receives() {
        let backbone = LocalBackbone::new();
        let mut a = backbone.subscribe("c1").await.unwrap();
        let mut b = backbone.subscribe("c1").await.unwrap();
        backbone.publish("c1", Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(a.next().await, Some(Bytes::from_static(b"x")));
        assert_eq!(b.next().await, Some(Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let backbone = LocalBackbone::new();
        let mut other = backbone.subscribe("c2").await.unwrap();
        backbone.publish("c1", Bytes::from_static(b"x")).await.unwrap();
        backbone.publish("c2", Bytes::from_static(b"y")).await.unwrap();

        assert_eq!(other.next().await, Some(Bytes::from_static(b"y")));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let backbone = LocalBackbone::new();
        assert!(backbone.publish("nobody", Bytes::new()).await.is_ok());
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let backbone = LocalBackbone::new();
        let stream = backbone.subscribe("c1").await.unwrap();
        assert_eq!(backbone.subscriber_count("c1"), 1);
        drop(stream);
        assert_eq!(backbone.subscriber_count("c1"), 0);

        backbone.publish("c1", Bytes::new()).await.unwrap();
        assert_eq!(backbone.subscriber_count("c1"), 0);
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_to_recent() {
        let backbone = LocalBackbone::with_capacity(2);
        let mut stream = backbone.subscribe("c1").await.unwrap();
        for i in 0..5u8 {
            backbone.publish("c1", Bytes::from(vec![i])).await.unwrap();
        }
        assert_eq!(stream.next().await, Some(Bytes::from(vec![3])));
        assert_eq!(stream.next().await, Some(Bytes::from(vec![4])));
    }
}
