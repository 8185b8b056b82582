//! The message envelope: one clipboard update plus its origin.
//!
//! Envelopes are immutable once built and never persisted. On the backbone
//! they travel as JSON with the keys `UserID`, `FromDevice` and `Payload`,
//! the payload base64-encoded, so hub instances of the earlier deployment can
//! share channels with this one.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, UserId};

/// Errors produced while moving an [`Envelope`] across the backbone.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The bytes received were not a well-formed envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// One clipboard update, addressed to every device of `user_id`
/// except `from_device`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "UserID")]
    user_id: UserId,
    #[serde(rename = "FromDevice")]
    from_device: DeviceId,
    #[serde(rename = "Payload", with = "base64_payload")]
    payload: Bytes,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(user_id: UserId, from_device: DeviceId, payload: Bytes) -> Self {
        Self {
            user_id,
            from_device,
            payload,
        }
    }

    /// The user whose devices should receive this update.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The device that produced this update.
    pub fn from_device(&self) -> &DeviceId {
        &self.from_device
    }

    /// The opaque clipboard payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Serialize to the backbone wire format.
    pub fn to_json(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::Encode)
    }

    /// Parse from the backbone wire format.
    pub fn from_json(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::Decode)
    }
}

/// Payload bytes as a base64 string; `null` reads as an empty payload.
mod base64_payload {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(Bytes::new()),
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Bytes::from)
                .map_err(serde::de::Error::custom),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
