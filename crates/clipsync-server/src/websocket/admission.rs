//! Connection admission: credentials are checked before the upgrade
//! handshake, so a refused caller never gets a connection.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clipsync_auth::{AuthError, TokenValidator};
use clipsync_core::{DeviceId, UserId};
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info};

use super::session::run_device_session;
use crate::metrics::ADMISSION_REJECTIONS_TOTAL;
use crate::server::AppState;

/// Query parameters of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Bearer token.
    pub token: Option<String>,
    /// Caller-chosen device label.
    pub device_id: Option<String>,
}

/// Reasons an upgrade attempt is refused.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// `token` or `device_id` absent or empty.
    #[error("Missing token or device_id")]
    MissingCredentials,

    /// The validator refused the token.
    #[error("Invalid or expired token: {0}")]
    InvalidToken(#[source] AuthError),

    /// Credentials were fine but the request was not a WebSocket upgrade.
    #[error(transparent)]
    NotUpgrade(#[from] WebSocketUpgradeRejection),
}

impl AdmissionError {
    fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidToken(_) => "invalid_token",
            Self::NotUpgrade(_) => "not_upgrade",
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        counter!(ADMISSION_REJECTIONS_TOTAL, "reason" => self.reason()).increment(1);
        match self {
            Self::MissingCredentials => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::InvalidToken(_) => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            Self::NotUpgrade(rejection) => rejection.into_response(),
        }
    }
}

/// Check credentials. Succeeds only with a non-empty device label and a
/// token the validator accepts.
pub fn admit(
    params: &ConnectParams,
    validator: &dyn TokenValidator,
) -> Result<(UserId, DeviceId), AdmissionError> {
    let token = params.token.as_deref().filter(|t| !t.is_empty());
    let device = params.device_id.as_deref().filter(|d| !d.is_empty());
    let (Some(token), Some(device)) = (token, device) else {
        return Err(AdmissionError::MissingCredentials);
    };

    let user_id = validator
        .validate_token(token)
        .map_err(AdmissionError::InvalidToken)?;
    Ok((user_id, DeviceId::from(device)))
}

/// `GET /ws?token=<jwt>&device_id=<label>`
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AdmissionError> {
    let (user_id, device_id) = admit(&params, state.validator.as_ref()).inspect_err(|e| {
        debug!(error = %e, "admission refused");
    })?;
    let upgrade = upgrade?;

    info!(user_id = %user_id, device_id = %device_id, "admitted, upgrading");
    let config = state.session;
    let hub = state.hub.clone();
    let fanout = state.fanout.clone();
    Ok(upgrade
        .max_message_size(config.max_message_size)
        .max_frame_size(config.max_message_size)
        .on_upgrade(move |socket| {
            run_device_session(socket, user_id, device_id, hub, fanout, config)
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct StaticValidator;

    impl TokenValidator for StaticValidator {
        fn validate_token(&self, token: &str) -> Result<UserId, AuthError> {
            match token {
                "good" => Ok(UserId::from("u1")),
                "old" => Err(AuthError::Expired),
                _ => Err(AuthError::MissingUserId),
            }
        }
    }

    fn params(token: Option<&str>, device: Option<&str>) -> ConnectParams {
        ConnectParams {
            token: token.map(str::to_string),
            device_id: device.map(str::to_string),
        }
    }

    #[test]
    fn valid_credentials_are_admitted() {
        let (user, device) = admit(&params(Some("good"), Some("laptop")), &StaticValidator).unwrap();
        assert_eq!(user.as_str(), "u1");
        assert_eq!(device.as_str(), "laptop");
    }

    #[test]
    fn missing_or_empty_values_are_refused() {
        for p in [
            params(None, Some("laptop")),
            params(Some("good"), None),
            params(Some(""), Some("laptop")),
            params(Some("good"), Some("")),
            params(None, None),
        ] {
            assert_matches!(admit(&p, &StaticValidator), Err(AdmissionError::MissingCredentials));
        }
    }

    #[test]
    fn missing_device_is_checked_before_token() {
        // An invalid token with no device still reports missing credentials.
        let err = admit(&params(Some("bad"), None), &StaticValidator).unwrap_err();
        assert_matches!(err, AdmissionError::MissingCredentials);
    }

    #[test]
    fn expired_token_is_refused() {
        let err = admit(&params(Some("old"), Some("laptop")), &StaticValidator).unwrap_err();
        assert_eq!(err.to_string(), "Invalid or expired token: token expired");
    }

    #[test]
    fn rejection_statuses() {
        let missing = AdmissionError::MissingCredentials.into_response();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let invalid = AdmissionError::InvalidToken(AuthError::Expired).into_response();
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
    }
}
