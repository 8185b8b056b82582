//! Connection registry: the single owner of per-user membership.
//!
//! One task owns the membership map and processes [`HubCommand`]s in
//! arrival order. Everything else talks to it through a cloneable
//! [`HubHandle`]; nothing reads or mutates membership concurrently.
//!
//! A user has an entry exactly while at least one of their connections is
//! registered, and the entry owns that user's backbone [`Subscription`]. The
//! first registration subscribes; removing the last connection (by
//! unregistration or eviction) drops the entry and with it the subscription.

use std::collections::HashMap;
use std::sync::Arc;

use clipsync_core::{ConnectionId, Envelope, UserId};
use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fanout::{Fanout, Subscription};
use crate::metrics::{DELIVERIES_TOTAL, SLOW_CONSUMER_EVICTIONS_TOTAL, SUBSCRIPTIONS_ACTIVE};
use crate::websocket::connection::DeviceConnection;

/// Requests processed by the registry loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a connection under its user.
    Register(DeviceConnection),
    /// Remove a connection and close its outbound queue. No-op if absent.
    Unregister {
        /// Owning user.
        user_id: UserId,
        /// Connection to remove.
        connection_id: ConnectionId,
    },
    /// Deliver an envelope to the user's local connections, except the
    /// originating device.
    Broadcast(Envelope),
    /// Read membership counters.
    Stats {
        /// Also count connections for this user.
        user_id: Option<UserId>,
        /// Where to send the answer.
        reply: oneshot::Sender<HubStats>,
    },
}

/// Membership counters, read through the registry loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Users with at least one registered connection.
    pub users: usize,
    /// Registered connections across all users.
    pub connections: usize,
    /// Registered connections for the queried user, if one was named.
    pub user_connections: Option<usize>,
}

struct UserEntry {
    connections: HashMap<ConnectionId, DeviceConnection>,
    _subscription: Subscription,
}

/// The registry state. Lives inside the task started by [`Hub::spawn`].
pub struct Hub {
    members: HashMap<UserId, UserEntry>,
    fanout: Arc<dyn Fanout>,
    commands: mpsc::WeakSender<HubCommand>,
}

impl Hub {
    /// Start the registry loop.
    ///
    /// The loop ends when `shutdown` fires or every [`HubHandle`] is gone.
    /// On exit all connections are dropped, which closes their queues.
    pub fn spawn(
        fanout: Arc<dyn Fanout>,
        command_capacity: usize,
        shutdown: CancellationToken,
    ) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(command_capacity.max(1));
        let hub = Self {
            members: HashMap::new(),
            fanout,
            commands: tx.downgrade(),
        };
        let task = tokio::spawn(hub.run(rx, shutdown));
        (HubHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>, shutdown: CancellationToken) {
        debug!("registry loop started");
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        let connections = self.connection_count();
        for _ in self.members.drain() {
            gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
        }
        info!(connections, "registry loop stopped, connections closed");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(conn) => self.register(conn),
            HubCommand::Unregister {
                user_id,
                connection_id,
            } => self.unregister(&user_id, &connection_id),
            HubCommand::Broadcast(envelope) => self.broadcast(&envelope),
            HubCommand::Stats { user_id, reply } => {
                let _ = reply.send(self.stats(user_id.as_ref()));
            }
        }
    }

    fn register(&mut self, conn: DeviceConnection) {
        let user_id = conn.user_id().clone();
        debug!(
            user_id = %user_id,
            device_id = %conn.device_id(),
            connection_id = %conn.id(),
            "registering connection"
        );

        if !self.members.contains_key(&user_id) {
            let hub = WeakHubHandle {
                tx: self.commands.clone(),
            };
            let subscription = self.fanout.subscribe(&user_id, hub);
            gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);
            info!(user_id = %user_id, "first connection for user, subscribed");
            let _ = self.members.insert(
                user_id.clone(),
                UserEntry {
                    connections: HashMap::new(),
                    _subscription: subscription,
                },
            );
        }

        if let Some(entry) = self.members.get_mut(&user_id) {
            let _ = entry.connections.insert(conn.id().clone(), conn);
        }
    }

    fn unregister(&mut self, user_id: &UserId, connection_id: &ConnectionId) {
        let Some(entry) = self.members.get_mut(user_id) else {
            return;
        };
        if entry.connections.remove(connection_id).is_none() {
            return;
        }
        debug!(user_id = %user_id, connection_id = %connection_id, "connection unregistered");
        if entry.connections.is_empty() {
            self.remove_user(user_id);
        }
    }

    fn broadcast(&mut self, envelope: &Envelope) {
        let user_id = envelope.user_id();
        let Some(entry) = self.members.get_mut(user_id) else {
            debug!(user_id = %user_id, "no local connections for user");
            return;
        };

        let mut evicted = Vec::new();
        for (id, conn) in &entry.connections {
            if conn.device_id() == envelope.from_device() {
                continue;
            }
            match conn.try_deliver(envelope.payload().clone()) {
                Ok(()) => counter!(DELIVERIES_TOTAL).increment(1),
                Err(failure) => {
                    warn!(
                        user_id = %user_id,
                        device_id = %conn.device_id(),
                        connection_id = %id,
                        reason = failure.as_str(),
                        "evicting slow consumer"
                    );
                    counter!(SLOW_CONSUMER_EVICTIONS_TOTAL).increment(1);
                    evicted.push(id.clone());
                }
            }
        }

        for id in &evicted {
            let _ = entry.connections.remove(id);
        }
        if entry.connections.is_empty() {
            self.remove_user(user_id);
        }
    }

    fn remove_user(&mut self, user_id: &UserId) {
        if self.members.remove(user_id).is_some() {
            gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
            info!(user_id = %user_id, "last connection for user gone, unsubscribed");
        }
    }

    fn stats(&self, user_id: Option<&UserId>) -> HubStats {
        HubStats {
            users: self.members.len(),
            connections: self.connection_count(),
            user_connections: user_id.map(|user| {
                self.members
                    .get(user)
                    .map_or(0, |entry| entry.connections.len())
            }),
        }
    }

    fn connection_count(&self) -> usize {
        self.members.values().map(|e| e.connections.len()).sum()
    }
}

/// Cloneable handle to the registry loop.
///
/// Requests sent after the loop has stopped are dropped.
#[derive(Clone, Debug)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a connection. The registry takes ownership of its queue sender.
    pub async fn register(&self, conn: DeviceConnection) {
        self.send(HubCommand::Register(conn)).await;
    }

    /// Unregister a connection. Idempotent.
    pub async fn unregister(&self, user_id: &UserId, connection_id: &ConnectionId) {
        self.send(HubCommand::Unregister {
            user_id: user_id.clone(),
            connection_id: connection_id.clone(),
        })
        .await;
    }

    /// Deliver an envelope to this instance's connections for its user.
    pub async fn broadcast_local(&self, envelope: Envelope) {
        self.send(HubCommand::Broadcast(envelope)).await;
    }

    /// Read membership counters. `None` once the loop has stopped.
    pub async fn stats(&self, user_id: Option<&UserId>) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats {
            user_id: user_id.cloned(),
            reply,
        })
        .await;
        rx.await.ok()
    }

    /// A handle that does not keep the registry loop alive.
    pub fn downgrade(&self) -> WeakHubHandle {
        WeakHubHandle {
            tx: self.tx.downgrade(),
        }
    }

    async fn send(&self, command: HubCommand) {
        if self.tx.send(command).await.is_err() {
            debug!("registry loop stopped, command dropped");
        }
    }
}

/// Non-owning [`HubHandle`], held by backbone receive loops so that a
/// subscription owned by the registry never keeps the registry running.
#[derive(Clone, Debug)]
pub struct WeakHubHandle {
    tx: mpsc::WeakSender<HubCommand>,
}

impl WeakHubHandle {
    /// The live handle, or `None` once every [`HubHandle`] is gone.
    pub fn upgrade(&self) -> Option<HubHandle> {
        self.tx.upgrade().map(|tx| HubHandle { tx })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
