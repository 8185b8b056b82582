//! # clipsync-settings
//!
//! Configuration for the ClipSync hub, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults** — [`ClipSyncSettings::default()`]
//! 2. **Settings file** — `~/.clipsync/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `CLIPSYNC_*` overrides (highest priority)
//!
//! The binary applies its CLI flags on top and then calls
//! [`ClipSyncSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;
