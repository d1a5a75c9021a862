//! Route handlers and shared response plumbing.

pub mod auth;
pub mod health;
pub mod root;

use axum::{
    http::{header::RETRY_AFTER, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// Uniform message body for non-payload responses.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    #[must_use]
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn fail(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

/// Map a core error to its HTTP shape. Security decisions keep their generic
/// display messages; faults are logged here and answered without detail.
pub fn error_response(err: AuthError) -> Response {
    match err {
        AuthError::TokenInvalid | AuthError::PasswordPolicy { .. } => (
            StatusCode::BAD_REQUEST,
            Json(ApiMessage::fail(&err.to_string())),
        )
            .into_response(),
        AuthError::RateLimited { retry_after } => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                headers.insert(RETRY_AFTER, value);
            }
            (
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                Json(ApiMessage::fail(&err.to_string())),
            )
                .into_response()
        }
        AuthError::SessionExpired => (
            StatusCode::UNAUTHORIZED,
            Json(ApiMessage::fail(&err.to_string())),
        )
            .into_response(),
        AuthError::AccountLocked => (
            StatusCode::LOCKED,
            Json(ApiMessage::fail(&err.to_string())),
        )
            .into_response(),
        AuthError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ApiMessage::fail(&err.to_string())),
        )
            .into_response(),
        AuthError::NotifierFailed(detail) => {
            error!("notifier failure: {detail}");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiMessage::fail("Failed to send notification")),
            )
                .into_response()
        }
        AuthError::Infrastructure(detail) => {
            error!("infrastructure failure: {detail:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiMessage::fail("Internal error")),
            )
                .into_response()
        }
    }
}

/// Generic denial body; every credential failure answers with this.
#[must_use]
pub fn denied() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiMessage::fail("Invalid credentials")),
    )
        .into_response()
}

/// Extract a bearer token from the Authorization header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
