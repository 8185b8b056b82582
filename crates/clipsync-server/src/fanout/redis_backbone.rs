//! Redis pub/sub backbone.
//!
//! Channel names and payloads match the existing hub deployment, so both can share
//! one Redis during a migration.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use super::backbone::{Backbone, BackboneError, BackboneStream};

/// Backbone backed by Redis `PUBLISH` / `SUBSCRIBE`.
///
/// Publishes share one multiplexed connection. Each subscription opens its
/// own pub/sub connection, closed when the returned stream is dropped.
pub struct RedisBackbone {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl RedisBackbone {
    /// Connect to `url` (for example `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, BackboneError> {
        let client =
            redis::Client::open(url).map_err(|e| BackboneError::Connection(e.to_string()))?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackboneError::Connection(e.to_string()))?;
        info!("connected to redis backbone");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl Backbone for RedisBackbone {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BackboneError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(channel, payload.as_ref())
            .await
            .map_err(|e| BackboneError::Publish {
                channel: channel.to_string(),
                message: e.to_string(),
            })?;
        debug!(channel, receivers, "published to redis");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BackboneStream, BackboneError> {
        let subscribe_err = |e: redis::RedisError| BackboneError::Subscribe {
            channel: channel.to_string(),
            message: e.to_string(),
        };
        let mut pubsub = self.client.get_async_pubsub().await.map_err(subscribe_err)?;
        pubsub.subscribe(channel).await.map_err(subscribe_err)?;
        debug!(channel, "subscribed to redis channel");

        let stream = pubsub
            .into_on_message()
            .map(|msg| Bytes::copy_from_slice(msg.get_payload_bytes()));
        Ok(Box::pin(stream))
    }
}
