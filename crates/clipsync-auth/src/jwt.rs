//! HS256 JWT validation and issuing.
//!
//! Tokens carry a `user_id` claim and an `exp` claim. Any other claims
//! (the account service also sets `email`) are ignored.

use chrono::{Duration, Utc};
use clipsync_core::UserId;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TokenValidator;
use crate::errors::AuthError;

/// Claims read from and written to hub tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account identity. An absent claim decodes as empty and is rejected.
    #[serde(default)]
    pub user_id: String,
    /// Expiry as a Unix timestamp in seconds.
    pub exp: i64,
}

/// Validates HS256 tokens signed with a shared secret.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Build a validator for `secret`.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator").finish_non_exhaustive()
    }
}

impl TokenValidator for JwtValidator {
    fn validate_token(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::from(e)
        })?;
        if data.claims.user_id.is_empty() {
            return Err(AuthError::MissingUserId);
        }
        Ok(UserId::from(data.claims.user_id))
    }
}

/// Sign a token for `user_id` that expires `ttl` from now.
///
/// A negative `ttl` produces an already-expired token.
pub fn issue_token(secret: &[u8], user_id: &UserId, ttl: Duration) -> Result<String, AuthError> {
    let claims = Claims {
        user_id: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(AuthError::Signing)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
