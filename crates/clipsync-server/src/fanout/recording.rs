//! In-memory [`Fanout`] that records calls, for registry and session tests.

use async_trait::async_trait;
use clipsync_core::{Envelope, UserId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Fanout, Subscription};
use crate::hub::WeakHubHandle;

#[derive(Default)]
pub(crate) struct RecordingFanout {
    published: Mutex<Vec<Envelope>>,
    subscriptions: Mutex<Vec<(UserId, CancellationToken)>>,
}

impl RecordingFanout {
    pub(crate) fn published(&self) -> Vec<Envelope> {
        self.published.lock().clone()
    }

    /// Subscriptions opened for `user_id`, oldest first.
    pub(crate) fn subscriptions_for(&self, user_id: &str) -> Vec<CancellationToken> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|(user, _)| user.as_str() == user_id)
            .map(|(_, token)| token.clone())
            .collect()
    }

    /// Subscriptions opened for `user_id` that have not been dropped.
    pub(crate) fn live_subscriptions(&self, user_id: &str) -> usize {
        self.subscriptions_for(user_id)
            .iter()
            .filter(|token| !token.is_cancelled())
            .count()
    }
}

#[async_trait]
impl Fanout for RecordingFanout {
    async fn publish(&self, envelope: Envelope) {
        self.published.lock().push(envelope);
    }

    fn subscribe(&self, user_id: &UserId, _hub: WeakHubHandle) -> Subscription {
        let token = CancellationToken::new();
        self.subscriptions
            .lock()
            .push((user_id.clone(), token.clone()));
        Subscription::new(token)
    }
}
