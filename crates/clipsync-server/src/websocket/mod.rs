//! WebSocket gateway: admission, per-device sessions, liveness.

pub mod admission;
pub mod connection;
pub mod heartbeat;
pub mod session;
