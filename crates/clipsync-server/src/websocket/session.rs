//! Device session lifecycle: one admitted WebSocket from registration
//! through disconnect.
//!
//! The socket is split into two duties:
//! - the **writer** task drains the outbound queue, pings on a ticker, and
//!   sends a Close frame once the registry drops the queue;
//! - the **reader** turns every data frame into an [`Envelope`] and hands it
//!   to the fan-out, and watches the pong deadline.
//!
//! Either side ending ends the session. The reader always finishes by
//! unregistering, which closes the queue and lets the writer say goodbye.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use clipsync_core::{DeviceId, Envelope, UserId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::DeviceConnection;
use super::heartbeat::{Liveness, ping_ticker};
use crate::config::SessionConfig;
use crate::fanout::Fanout;
use crate::hub::HubHandle;
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL,
};

/// Why the reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEnd {
    /// The peer sent a Close frame or the stream ended.
    Closed,
    /// No Pong within the liveness timeout.
    LivenessTimeout,
    /// The transport reported an error (including oversize frames).
    Error(String),
    /// The writer stopped, so the transport is gone.
    WriterStopped,
}

impl ReadEnd {
    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::LivenessTimeout => "liveness_timeout",
            Self::Error(_) => "read_error",
            Self::WriterStopped => "writer_stopped",
        }
    }
}

/// Why the writer stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEnd {
    /// The registry dropped the queue; a Close frame was attempted.
    QueueClosed,
    /// A write did not finish within the write deadline.
    Timeout,
    /// The transport rejected a write.
    Error(String),
}

/// Run a session for an admitted device.
#[instrument(skip_all, fields(user_id = %user_id, device_id = %device_id, connection_id))]
pub async fn run_device_session(
    ws: WebSocket,
    user_id: UserId,
    device_id: DeviceId,
    hub: HubHandle,
    fanout: Arc<dyn Fanout>,
    config: SessionConfig,
) {
    let (connection, queue) =
        DeviceConnection::new(user_id.clone(), device_id.clone(), config.outbound_queue_capacity);
    let connection_id = connection.id().clone();
    let _ = tracing::Span::current().record("connection_id", tracing::field::display(&connection_id));

    let started = Instant::now();
    info!("device connected");
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);

    hub.register(connection).await;

    let (ws_tx, ws_rx) = ws.split();
    let writer_done = CancellationToken::new();
    let mut writer = tokio::spawn(write_pump(
        ws_tx,
        queue,
        config.heartbeat_interval,
        config.write_timeout,
        writer_done.clone(),
    ));

    let end = read_pump(
        ws_rx,
        &user_id,
        &device_id,
        fanout.as_ref(),
        config.liveness_timeout,
        &writer_done,
    )
    .await;

    match &end {
        ReadEnd::Closed => debug!("peer closed connection"),
        ReadEnd::LivenessTimeout => warn!(timeout = ?config.liveness_timeout, "no pong in time, disconnecting"),
        ReadEnd::Error(e) => info!(error = %e, "read failed, disconnecting"),
        ReadEnd::WriterStopped => debug!("writer stopped, disconnecting"),
    }

    hub.unregister(&user_id, &connection_id).await;

    // Unregistering closes the queue; the writer sends Close and exits
    // within one write deadline.
    if tokio::time::timeout(config.write_timeout * 2, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(reason = end.as_str(), "device disconnected");
    counter!(DISCONNECTIONS_TOTAL, "reason" => end.as_str()).increment(1);
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Read frames until the peer goes away, publishing each data frame in
/// arrival order.
pub(crate) async fn read_pump<S, E>(
    mut stream: S,
    user_id: &UserId,
    device_id: &DeviceId,
    fanout: &dyn Fanout,
    liveness_timeout: Duration,
    writer_done: &CancellationToken,
) -> ReadEnd
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut liveness = Liveness::new(liveness_timeout);
    loop {
        let next = tokio::select! {
            biased;
            () = writer_done.cancelled() => return ReadEnd::WriterStopped,
            next = tokio::time::timeout_at(liveness.deadline(), stream.next()) => next,
        };

        let message = match next {
            Err(_elapsed) => return ReadEnd::LivenessTimeout,
            Ok(None) => return ReadEnd::Closed,
            Ok(Some(Err(e))) => return ReadEnd::Error(e.to_string()),
            Ok(Some(Ok(message))) => message,
        };

        let payload = match message {
            Message::Text(text) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Message::Binary(data) => data,
            Message::Pong(_) => {
                liveness.pong_received();
                continue;
            }
            // Answered by the transport.
            Message::Ping(_) => continue,
            Message::Close(_) => return ReadEnd::Closed,
        };

        debug!(len = payload.len(), "frame received");
        fanout
            .publish(Envelope::new(user_id.clone(), device_id.clone(), payload))
            .await;
    }
}

/// Drain the outbound queue into the socket and ping on a ticker.
///
/// Cancels `done` on exit so the reader stops too.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Bytes>,
    heartbeat_interval: Duration,
    write_timeout: Duration,
    done: CancellationToken,
) -> WriteEnd
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = ping_ticker(heartbeat_interval);
    let end = loop {
        let frame = tokio::select! {
            item = queue.recv() => match item {
                Some(payload) => payload_frame(payload),
                None => {
                    let _ = send_frame(&mut sink, Message::Close(None), write_timeout).await;
                    break WriteEnd::QueueClosed;
                }
            },
            _ = ticker.tick() => Message::Ping(Bytes::new()),
        };
        if let Err(end) = send_frame(&mut sink, frame, write_timeout).await {
            break end;
        }
    };

    match &end {
        WriteEnd::QueueClosed => debug!("outbound queue closed"),
        WriteEnd::Timeout => warn!(timeout = ?write_timeout, "write deadline exceeded"),
        WriteEnd::Error(e) => debug!(error = %e, "write failed"),
    }
    done.cancel();
    end
}

async fn send_frame<S>(sink: &mut S, frame: Message, write_timeout: Duration) -> Result<(), WriteEnd>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(write_timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteEnd::Error(e.to_string())),
        Err(_) => Err(WriteEnd::Timeout),
    }
}

/// Payloads that are valid UTF-8 go out as Text frames, anything else as
/// Binary.
fn payload_frame(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::Text(text.into()),
        Err(_) => Message::Binary(payload),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
