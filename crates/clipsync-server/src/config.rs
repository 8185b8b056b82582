//! Server configuration.

use std::time::Duration;

use clipsync_settings::ServerSettings;

/// Per-connection transport limits shared by every session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Close the connection when no pong arrives within this window.
    pub liveness_timeout: Duration,
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Deadline for each frame write.
    pub write_timeout: Duration,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Payloads buffered per connection before it is evicted as a slow consumer.
    pub outbound_queue_capacity: usize,
}

impl SessionConfig {
    /// Derive the session limits. The heartbeat fires at nine tenths of the
    /// liveness timeout.
    pub fn new(
        liveness_timeout: Duration,
        write_timeout: Duration,
        max_message_size: usize,
        outbound_queue_capacity: usize,
    ) -> Self {
        Self {
            liveness_timeout,
            heartbeat_interval: liveness_timeout * 9 / 10,
            write_timeout,
            max_message_size,
            outbound_queue_capacity,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for SessionConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self::new(
            settings.liveness_timeout(),
            settings.write_timeout(),
            settings.max_message_size,
            settings.outbound_queue_capacity,
        )
    }
}

/// Configuration for the ClipSync server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Bound on the registry's command queue.
    pub command_queue_capacity: usize,
    /// Backbone channel namespace.
    pub channel_prefix: String,
    /// Transport limits for each session.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(server: &ServerSettings, channel_prefix: &str) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            command_queue_capacity: server.command_queue_capacity,
            channel_prefix: channel_prefix.to_string(),
            session: SessionConfig::from(server),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            command_queue_capacity: 1024,
            channel_prefix: clipsync_core::DEFAULT_CHANNEL_PREFIX.to_string(),
            session: SessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_is_nine_tenths_of_liveness() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.liveness_timeout, Duration::from_secs(60));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(54));
    }

    #[test]
    fn session_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.write_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_message_size, 2 * 1024 * 1024);
        assert_eq!(cfg.outbound_queue_capacity, 256);
    }

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn from_settings_carries_values() {
        let settings = ServerSettings {
            port: 9000,
            liveness_timeout_ms: 10_000,
            command_queue_capacity: 16,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from_settings(&settings, "dev:");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.command_queue_capacity, 16);
        assert_eq!(cfg.channel_prefix, "dev:");
        assert_eq!(cfg.session.heartbeat_interval, Duration::from_secs(9));
    }
}
