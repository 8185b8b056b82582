//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClipSyncSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `CLIPSYNC_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use clipsync_core::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{BackboneKind, ClipSyncSettings};

/// Resolve the path to the settings file (`~/.clipsync/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".clipsync").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClipSyncSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults with the settings file merged on top, without env overrides.
fn load_file_layer(path: &Path) -> Result<ClipSyncSettings> {
    let defaults = serde_json::to_value(ClipSyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_env_overrides(settings: &mut ClipSyncSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CLIPSYNC_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("CLIPSYNC_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_u64("CLIPSYNC_LIVENESS_TIMEOUT_MS", 1000, 3_600_000) {
        settings.server.liveness_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("CLIPSYNC_WRITE_TIMEOUT_MS", 100, 600_000) {
        settings.server.write_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("CLIPSYNC_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = read_env_usize("CLIPSYNC_OUTBOUND_QUEUE", 1, 65_536) {
        settings.server.outbound_queue_capacity = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CLIPSYNC_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read_env_u64("CLIPSYNC_TOKEN_TTL_SECS", 60, 31_536_000) {
        settings.auth.token_ttl_secs = v;
    }

    // ── Backbone ────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CLIPSYNC_BACKBONE") {
        match parse_backbone_kind(&v) {
            Some(kind) => settings.backbone.kind = kind,
            None => tracing::warn!(key = "CLIPSYNC_BACKBONE", value = %v, "unknown backbone kind, ignoring"),
        }
    }
    if let Some(v) = read_env_string("CLIPSYNC_REDIS_URL") {
        settings.backbone.redis_url = v;
    }
    if let Some(v) = read_env_string("CLIPSYNC_CHANNEL_PREFIX") {
        settings.backbone.channel_prefix = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("CLIPSYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("CLIPSYNC_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "CLIPSYNC_LOG_FORMAT", value = %v, "unknown log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a backbone kind (case-insensitive).
pub fn parse_backbone_kind(val: &str) -> Option<BackboneKind> {
    match val.to_lowercase().as_str() {
        "local" | "memory" => Some(BackboneKind::Local),
        "redis" => Some(BackboneKind::Redis),
        _ => None,
    }
}

/// Parse a log format (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
