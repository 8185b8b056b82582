//! # clipsync-core
//!
//! Foundation types shared by every ClipSync crate:
//!
//! - **Branded IDs**: `UserId`, `DeviceId`, `ConnectionId` as `String` newtypes
//! - **Envelope**: the transient unit carrying one clipboard update and its origin
//! - **Channels**: backbone channel naming, one channel per user
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod channel;
pub mod envelope;
pub mod ids;
pub mod logging;

pub use channel::{DEFAULT_CHANNEL_PREFIX, user_channel};
pub use envelope::{Envelope, EnvelopeError};
pub use ids::{ConnectionId, DeviceId, UserId};
pub use logging::{LogFormat, init_subscriber};
