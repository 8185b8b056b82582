//! # clipsync-auth
//!
//! Bearer token validation for connection admission.
//!
//! The hub never mints identities on its own: a token is issued by the account
//! service (or `clipsync token` in development) and [`TokenValidator`] turns
//! it into a [`UserId`] or a reason for refusal.

#![deny(unsafe_code)]

pub mod errors;
pub mod jwt;

use std::sync::Arc;

use clipsync_core::UserId;

pub use errors::AuthError;
pub use jwt::{Claims, JwtValidator, issue_token};

/// Maps a bearer token to the user it authenticates.
pub trait TokenValidator: Send + Sync {
    /// Validate `token` and return its user, or the reason it was refused.
    fn validate_token(&self, token: &str) -> Result<UserId, AuthError>;
}

impl<T: TokenValidator + ?Sized> TokenValidator for Arc<T> {
    fn validate_token(&self, token: &str) -> Result<UserId, AuthError> {
        (**self).validate_token(token)
    }
}
