//! Registry-side view of one admitted device connection.

use bytes::Bytes;
use clipsync_core::{ConnectionId, DeviceId, UserId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Why a payload could not be queued for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The outbound queue is at capacity (slow consumer).
    Full,
    /// The writer task has already exited.
    Closed,
}

impl DeliveryFailure {
    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "queue_full",
            Self::Closed => "writer_gone",
        }
    }
}

/// A device connection as held by the registry.
///
/// Owns the only sender of the connection's outbound queue: dropping this
/// value closes the queue, which tells the writer task to send a Close frame
/// and exit.
#[derive(Debug)]
pub struct DeviceConnection {
    id: ConnectionId,
    user_id: UserId,
    device_id: DeviceId,
    tx: mpsc::Sender<Bytes>,
}

impl DeviceConnection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn new(
        user_id: UserId,
        device_id: DeviceId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            user_id,
            device_id,
            tx,
        };
        (conn, rx)
    }

    /// Unique connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Owning user.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Device label supplied at admission.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Queue a payload without waiting.
    pub fn try_deliver(&self, payload: Bytes) -> Result<(), DeliveryFailure> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Full,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(capacity: usize) -> (DeviceConnection, mpsc::Receiver<Bytes>) {
        DeviceConnection::new(UserId::from("u1"), DeviceId::from("laptop"), capacity)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make(4);
        assert_eq!(conn.user_id().as_str(), "u1");
        assert_eq!(conn.device_id().as_str(), "laptop");
        assert!(!conn.id().is_empty());
    }

    #[test]
    fn ids_are_unique_per_connection() {
        let (a, _ra) = make(4);
        let (b, _rb) = make(4);
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn deliver_success() {
        let (conn, mut rx) = make(4);
        assert!(conn.try_deliver(Bytes::from_static(b"hello")).is_ok());
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn deliver_to_full_queue() {
        let (conn, _rx) = make(1);
        assert!(conn.try_deliver(Bytes::from_static(b"one")).is_ok());
        assert_eq!(
            conn.try_deliver(Bytes::from_static(b"two")),
            Err(DeliveryFailure::Full)
        );
    }

    #[test]
    fn deliver_after_writer_exit() {
        let (conn, rx) = make(4);
        drop(rx);
        assert_eq!(
            conn.try_deliver(Bytes::from_static(b"x")),
            Err(DeliveryFailure::Closed)
        );
    }

    #[tokio::test]
    async fn dropping_connection_closes_queue() {
        let (conn, mut rx) = make(4);
        drop(conn);
        assert!(rx.recv().await.is_none());
    }
}
