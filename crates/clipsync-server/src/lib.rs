//! # clipsync-server
//!
//! Real-time clipboard fan-out hub.
//!
//! - `WebSocket` gateway: token admission, per-device reader/writer duties,
//!   ping/pong liveness, bounded outbound queues
//! - Connection registry: one task owns per-user membership and performs
//!   local delivery with echo suppression and slow-consumer eviction
//! - Fan-out bridge: publishes every inbound frame to a per-user backbone
//!   channel and subscribes while a user has local connections
//! - Backbones: in-process channels, or Redis pub/sub with the `redis` feature
//! - HTTP: `/ws`, `/health`, `/metrics`; graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod fanout;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ServerConfig, SessionConfig};
pub use fanout::{Backbone, BackboneError, Fanout, FanoutBridge, LocalBackbone, connect_backbone};
pub use hub::{Hub, HubHandle, HubStats, WeakHubHandle};
pub use server::ClipSyncServer;
pub use shutdown::ShutdownCoordinator;
