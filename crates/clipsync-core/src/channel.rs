//! Backbone channel naming.

use crate::ids::UserId;

/// Namespace prefix that keeps clipboard channels apart from unrelated traffic.
pub const DEFAULT_CHANNEL_PREFIX: &str = "clipboard_sync:user:";

/// The backbone channel carrying every envelope for `user_id`.
pub fn user_channel(prefix: &str, user_id: &UserId) -> String {
    format!("{prefix}{user_id}")
}
