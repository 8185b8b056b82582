//! Settings types with compiled defaults.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only has
//! to name the keys it changes. JSON keys are camelCase.

use std::fmt;
use std::time::Duration;

use clipsync_core::{DEFAULT_CHANNEL_PREFIX, LogFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipSyncSettings {
    /// Network, transport and queue settings.
    pub server: ServerSettings,
    /// Token validation settings.
    pub auth: AuthSettings,
    /// Pub/sub backbone settings.
    pub backbone: BackboneSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl ClipSyncSettings {
    /// Reject settings the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(SettingsError::InvalidValue(
                "auth.jwtSecret must not be empty (set CLIPSYNC_JWT_SECRET)".into(),
            ));
        }
        if self.server.liveness_timeout_ms == 0 || self.server.write_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server timeouts must be greater than zero".into(),
            ));
        }
        if self.server.outbound_queue_capacity == 0 || self.server.command_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server queue capacities must be greater than zero".into(),
            ));
        }
        if self.backbone.kind == BackboneKind::Redis && self.backbone.redis_url.is_empty() {
            return Err(SettingsError::InvalidValue(
                "backbone.redisUrl is required when backbone.kind is \"redis\"".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and connection lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP / WebSocket port.
    pub port: u16,
    /// Close a connection when no pong arrives within this window.
    pub liveness_timeout_ms: u64,
    /// Deadline for every single frame write.
    pub write_timeout_ms: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Payloads buffered per connection before it counts as a slow consumer.
    pub outbound_queue_capacity: usize,
    /// Bound on the registry's command queue.
    pub command_queue_capacity: usize,
}

impl ServerSettings {
    /// Liveness timeout as a [`Duration`].
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    /// Write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            liveness_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            max_message_size: 2 * 1024 * 1024,
            outbound_queue_capacity: 256,
            command_queue_capacity: 1024,
        }
    }
}

/// Token validation settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 shared secret used to verify (and, for the CLI, issue) tokens.
    pub jwt_secret: String,
    /// Lifetime of tokens minted by `clipsync token`.
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Which backbone adapter carries envelopes between hub instances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackboneKind {
    /// In-process channels; a single hub process.
    #[default]
    Local,
    /// Redis pub/sub shared by every hub process.
    Redis,
}

/// Pub/sub backbone settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackboneSettings {
    /// Adapter selection.
    pub kind: BackboneKind,
    /// Redis connection URL, used when `kind` is `redis`.
    pub redis_url: String,
    /// Namespace prefix for per-user channels.
    pub channel_prefix: String,
}

impl Default for BackboneSettings {
    fn default() -> Self {
        Self {
            kind: BackboneKind::Local,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ClipSyncSettings {
        let mut s = ClipSyncSettings::default();
        s.auth.jwt_secret = "secret".into();
        s
    }

    #[test]
    fn server_defaults_match_deployed_hub() {
        let s = ServerSettings::default();
        assert_eq!(s.liveness_timeout(), Duration::from_secs(60));
        assert_eq!(s.write_timeout(), Duration::from_secs(10));
        assert_eq!(s.max_message_size, 2 * 1024 * 1024);
        assert_eq!(s.outbound_queue_capacity, 256);
        assert_eq!(s.port, 8080);
    }

    #[test]
    fn backbone_defaults() {
        let b = BackboneSettings::default();
        assert_eq!(b.kind, BackboneKind::Local);
        assert_eq!(b.channel_prefix, "clipboard_sync:user:");
    }

    #[test]
    fn default_settings_fail_validation_without_secret() {
        let err = ClipSyncSettings::default().validate().unwrap_err();
        assert!(err.to_string().contains("jwtSecret"));
    }

    #[test]
    fn settings_with_secret_validate() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let mut s = valid();
        s.server.outbound_queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn redis_without_url_is_rejected() {
        let mut s = valid();
        s.backbone.kind = BackboneKind::Redis;
        s.backbone.redis_url.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let mut s = valid();
        s.auth.jwt_secret = "hunter2".into();
        let debug = format!("{:?}", s.auth);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(ClipSyncSettings::default()).unwrap();
        assert!(json["server"]["livenessTimeoutMs"].is_number());
        assert!(json["backbone"]["channelPrefix"].is_string());
        assert_eq!(json["backbone"]["kind"], "local");
    }
}
