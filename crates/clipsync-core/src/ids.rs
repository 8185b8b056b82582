//! Branded ID newtypes for type safety.
//!
//! Every identity in the hub is a distinct newtype wrapper around `String`,
//! so a device label can never be passed where a user identity is expected.
//! `UserId` comes from the authentication collaborator, `DeviceId` from the
//! client, and `ConnectionId` is minted here (UUID v7) for each admitted
//! connection.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the underlying string is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Authenticated identity shared by all of a user's devices.
    UserId
}

branded_id! {
    /// Caller-supplied device label. Used only for echo suppression.
    DeviceId
}

branded_id! {
    /// Unique identifier for one admitted connection.
    ConnectionId
}

impl ConnectionId {
    /// Create a new random connection ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_new_is_uuid_v7() {
        let id = ConnectionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_str_ref() {
        let id = UserId::from("user-123");
        assert_eq!(id.as_str(), "user-123");
    }

    #[test]
    fn deref_to_str() {
        let id = DeviceId::from("laptop");
        let s: &str = &id;
        assert_eq!(s, "laptop");
    }

    #[test]
    fn display() {
        let id = UserId::from("display-me");
        assert_eq!(format!("{id}"), "display-me");
    }

    #[test]
    fn empty_detection() {
        assert!(DeviceId::from("").is_empty());
        assert!(!DeviceId::from("phone").is_empty());
    }

    #[test]
    fn serde_is_transparent() {
        let id = UserId::from("serde-test");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"serde-test\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
