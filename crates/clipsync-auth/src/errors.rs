//! Auth error types.

/// Reasons a bearer token is refused.
///
/// The `Display` text is surfaced to the client after the
/// `Invalid or expired token: ` prefix, so it stays short.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `exp` claim is in the past.
    #[error("token expired")]
    Expired,

    /// The token carries no usable `user_id` claim.
    #[error("user_id missing in token")]
    MissingUserId,

    /// Signature, structure or algorithm check failed.
    #[error("{0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    /// Signing a new token failed.
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Invalid(err),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
