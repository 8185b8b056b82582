//! Fan-out between the local registry and the shared backbone.
//!
//! Every inbound frame is published to the backbone, and every live user
//! holds one backbone subscription that feeds the local registry. The
//! originating instance hears its own envelopes through the same path as
//! every other instance.

pub mod backbone;
#[cfg(feature = "redis")]
pub mod redis_backbone;
#[cfg(test)]
pub(crate) mod recording;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clipsync_core::{Envelope, UserId, user_channel};
use clipsync_settings::{BackboneKind, BackboneSettings};
use futures::StreamExt;
use metrics::counter;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use crate::hub::WeakHubHandle;
use crate::metrics::{DECODE_FAILURES_TOTAL, ENVELOPES_PUBLISHED_TOTAL, PUBLISH_FAILURES_TOTAL};

pub use backbone::{Backbone, BackboneError, BackboneStream, LocalBackbone};
#[cfg(feature = "redis")]
pub use redis_backbone::RedisBackbone;

/// First delay before re-opening a failed backbone subscription.
const RESUBSCRIBE_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Upper bound on the re-subscribe delay.
const RESUBSCRIBE_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Registry-facing side of the backbone.
#[async_trait]
pub trait Fanout: Send + Sync {
    /// Publish an envelope. Failures are logged and swallowed.
    async fn publish(&self, envelope: Envelope);

    /// Start delivering backbone traffic for `user_id` into `hub`.
    ///
    /// Delivery stops when the returned [`Subscription`] is dropped or the
    /// registry behind `hub` is gone.
    fn subscribe(&self, user_id: &UserId, hub: WeakHubHandle) -> Subscription;
}

/// A live per-user backbone subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    _guard: DropGuard,
}

impl Subscription {
    /// Tie a subscription to `token`: dropping the subscription cancels it.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            _guard: token.drop_guard(),
        }
    }
}

/// [`Fanout`] over a [`Backbone`], one channel per user.
pub struct FanoutBridge {
    backbone: Arc<dyn Backbone>,
    channel_prefix: String,
    shutdown: CancellationToken,
}

impl FanoutBridge {
    /// Create a bridge. Receive loops stop when `shutdown` fires.
    pub fn new(
        backbone: Arc<dyn Backbone>,
        channel_prefix: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            backbone,
            channel_prefix: channel_prefix.into(),
            shutdown,
        }
    }

    fn channel_for(&self, user_id: &UserId) -> String {
        user_channel(&self.channel_prefix, user_id)
    }
}

#[async_trait]
impl Fanout for FanoutBridge {
    async fn publish(&self, envelope: Envelope) {
        let channel = self.channel_for(envelope.user_id());
        let body = match envelope.to_json() {
            Ok(body) => body,
            Err(e) => {
                warn!(channel = %channel, error = %e, "failed to encode envelope");
                counter!(PUBLISH_FAILURES_TOTAL).increment(1);
                return;
            }
        };
        match self.backbone.publish(&channel, Bytes::from(body)).await {
            Ok(()) => counter!(ENVELOPES_PUBLISHED_TOTAL).increment(1),
            Err(e) => {
                warn!(channel = %channel, error = %e, "backbone publish failed");
                counter!(PUBLISH_FAILURES_TOTAL).increment(1);
            }
        }
    }

    fn subscribe(&self, user_id: &UserId, hub: WeakHubHandle) -> Subscription {
        let token = self.shutdown.child_token();
        let channel = self.channel_for(user_id);
        drop(tokio::spawn(receive_loop(
            self.backbone.clone(),
            channel,
            hub,
            token.clone(),
        )));
        Subscription::new(token)
    }
}

/// Build the backbone named by `settings`.
pub async fn connect_backbone(
    settings: &BackboneSettings,
) -> Result<Arc<dyn Backbone>, BackboneError> {
    match settings.kind {
        BackboneKind::Local => {
            info!("using in-process backbone");
            Ok(Arc::new(LocalBackbone::new()))
        }
        #[cfg(feature = "redis")]
        BackboneKind::Redis => {
            let backbone = redis_backbone::RedisBackbone::connect(&settings.redis_url).await?;
            Ok(Arc::new(backbone))
        }
        #[cfg(not(feature = "redis"))]
        BackboneKind::Redis => Err(BackboneError::Connection(
            "redis backbone requires the `redis` feature".into(),
        )),
    }
}

/// Feed one user's backbone channel into the local registry until `cancel`
/// fires or the registry is gone. A subscription that fails or ends is
/// re-opened with backoff.
#[instrument(skip_all, fields(channel = %channel))]
async fn receive_loop(
    backbone: Arc<dyn Backbone>,
    channel: String,
    hub: WeakHubHandle,
    cancel: CancellationToken,
) {
    let mut backoff = RESUBSCRIBE_INITIAL_BACKOFF;
    loop {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            res = backbone.subscribe(&channel) => res,
        };

        match opened {
            Ok(stream) => {
                debug!("backbone subscription open");
                backoff = RESUBSCRIBE_INITIAL_BACKOFF;
                if pump(stream, &hub, &cancel).await == PumpEnd::Stopped {
                    break;
                }
                warn!("backbone subscription ended, re-subscribing");
            }
            Err(e) => {
                warn!(error = %e, retry_in_ms = backoff.as_millis(), "backbone subscribe failed");
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(RESUBSCRIBE_MAX_BACKOFF);
    }
    debug!("backbone subscription closed");
}

#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    Stopped,
    StreamEnded,
}

async fn pump(
    mut stream: BackboneStream,
    hub: &WeakHubHandle,
    cancel: &CancellationToken,
) -> PumpEnd {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => return PumpEnd::Stopped,
            message = stream.next() => message,
        };
        let Some(message) = message else {
            return PumpEnd::StreamEnded;
        };

        match Envelope::from_json(&message) {
            Ok(envelope) => {
                let Some(hub) = hub.upgrade() else {
                    debug!("registry gone, dropping subscription");
                    return PumpEnd::Stopped;
                };
                hub.broadcast_local(envelope).await;
            }
            Err(e) => {
                warn!(error = %e, len = message.len(), "skipping malformed backbone message");
                counter!(DECODE_FAILURES_TOTAL).increment(1);
            }
        }
    }
}
