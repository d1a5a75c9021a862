//! Authentication endpoints.
//!
//! Every handler delegates the security decision to the core and only shapes
//! the HTTP surface: denial details never leave the audit log.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Json as JsonBody,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{Authenticator, LoginOutcome};
use crate::identity::{normalize_email, valid_email};

use super::{bearer_token, denied, error_response, ApiMessage};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyRequest {
    pub email: String,
    pub code: String,
    pub binding_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub session_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorPendingResponse {
    pub binding_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionInfo {
    pub email: String,
}

fn checked_email(email: &str) -> Result<String, Response> {
    let email = normalize_email(email);
    if valid_email(&email) {
        Ok(email)
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            Json(ApiMessage::fail("Invalid email")),
        )
            .into_response())
    }
}

/// Issue an email-confirmation token, throttled per email.
#[utoipa::path(
    post,
    path = "/v1/auth/token",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 429, description = "Rate limited", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn issue_token(
    authenticator: Extension<Arc<Authenticator>>,
    JsonBody(request): JsonBody<EmailRequest>,
) -> Response {
    let email = match checked_email(&request.email) {
        Ok(email) => email,
        Err(response) => return response,
    };

    match authenticator.issue_confirmation_token(&email).await {
        Ok(token) => Json(TokenResponse { token }).into_response(),
        Err(err) => error_response(err),
    }
}

/// Confirm an email-confirmation token.
#[utoipa::path(
    get,
    path = "/v1/auth/confirm/{token}",
    params(("token" = String, Path, description = "Confirmation token")),
    responses(
        (status = 200, description = "Token confirmed", body = ApiMessage),
        (status = 400, description = "Invalid or expired token", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn confirm_token(
    authenticator: Extension<Arc<Authenticator>>,
    Path(token): Path<String>,
) -> Response {
    match authenticator.confirm_token(&token) {
        Ok(_) => Json(ApiMessage::ok("Token confirmed")).into_response(),
        Err(err) => error_response(err),
    }
}

/// Issue a fresh 2FA challenge for an existing account.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/send",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Challenge sent", body = TwoFactorPendingResponse),
        (status = 404, description = "Unknown account", body = ApiMessage),
        (status = 423, description = "Account is locked", body = ApiMessage),
        (status = 502, description = "Delivery failed", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn two_factor_send(
    authenticator: Extension<Arc<Authenticator>>,
    JsonBody(request): JsonBody<EmailRequest>,
) -> Response {
    let email = match checked_email(&request.email) {
        Ok(email) => email,
        Err(response) => return response,
    };

    match authenticator.send_two_factor(&email).await {
        Ok(binding_token) => Json(TwoFactorPendingResponse { binding_token }).into_response(),
        Err(err) => error_response(err),
    }
}

/// Complete an email-OTP login.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = ApiMessage),
        (status = 404, description = "Unknown account", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn two_factor_verify(
    authenticator: Extension<Arc<Authenticator>>,
    JsonBody(request): JsonBody<TwoFactorVerifyRequest>,
) -> Response {
    match authenticator
        .verify_two_factor(&request.email, &request.code, &request.binding_token)
        .await
    {
        Ok(LoginOutcome::Success { session_token }) => {
            Json(SessionResponse { session_token }).into_response()
        }
        Ok(_) => denied(),
        Err(err) => error_response(err),
    }
}

/// Password login; may answer with a pending 2FA challenge.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionResponse),
        (status = 202, description = "Second factor required", body = TwoFactorPendingResponse),
        (status = 401, description = "Invalid credentials", body = ApiMessage),
        (status = 429, description = "Rate limited", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn login(
    authenticator: Extension<Arc<Authenticator>>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Response {
    let email = match checked_email(&request.email) {
        Ok(email) => email,
        Err(response) => return response,
    };

    match authenticator
        .login(&email, &request.password, request.fingerprint.as_deref())
        .await
    {
        Ok(LoginOutcome::Success { session_token }) => {
            Json(SessionResponse { session_token }).into_response()
        }
        Ok(LoginOutcome::TwoFactorPending { binding_token }) => (
            StatusCode::ACCEPTED,
            Json(TwoFactorPendingResponse { binding_token }),
        )
            .into_response(),
        Ok(LoginOutcome::Denied(_)) => denied(),
        Err(err) => error_response(err),
    }
}

/// Start a password reset. Always answers accepted so the endpoint cannot be
/// used to enumerate accounts.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Reset requested", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    authenticator: Extension<Arc<Authenticator>>,
    JsonBody(request): JsonBody<EmailRequest>,
) -> Response {
    let email = match checked_email(&request.email) {
        Ok(email) => email,
        Err(response) => return response,
    };

    match authenticator.request_password_reset(&email).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(ApiMessage::ok("If the account exists, a reset email was sent")),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

/// Complete a password reset with a purpose-scoped token.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password/{token}",
    request_body = ResetPasswordRequest,
    params(("token" = String, Path, description = "Reset token")),
    responses(
        (status = 200, description = "Password updated", body = ApiMessage),
        (status = 400, description = "Invalid token or password too short", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    authenticator: Extension<Arc<Authenticator>>,
    Path(token): Path<String>,
    JsonBody(request): JsonBody<ResetPasswordRequest>,
) -> Response {
    match authenticator.reset_password(&token, &request.password).await {
        Ok(_) => Json(ApiMessage::ok("Password updated")).into_response(),
        Err(err) => error_response(err),
    }
}

/// Administrative lock.
#[utoipa::path(
    post,
    path = "/v1/auth/lock",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Account locked", body = ApiMessage),
        (status = 404, description = "Unknown account", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn lock_account(
    authenticator: Extension<Arc<Authenticator>>,
    JsonBody(request): JsonBody<EmailRequest>,
) -> Response {
    let email = match checked_email(&request.email) {
        Ok(email) => email,
        Err(response) => return response,
    };

    match authenticator.lock_account(&email).await {
        Ok(()) => Json(ApiMessage::ok("Account locked")).into_response(),
        Err(err) => error_response(err),
    }
}

/// Token-based unlock from the lock notification email.
#[utoipa::path(
    post,
    path = "/v1/auth/unlock/{token}",
    params(("token" = String, Path, description = "Unlock token")),
    responses(
        (status = 200, description = "Account unlocked", body = ApiMessage),
        (status = 400, description = "Invalid or expired token", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn unlock_account(
    authenticator: Extension<Arc<Authenticator>>,
    Path(token): Path<String>,
) -> Response {
    match authenticator.unlock_account(&token).await {
        Ok(_) => Json(ApiMessage::ok("Account unlocked")).into_response(),
        Err(err) => error_response(err),
    }
}

/// Validate the bearer session and slide its expiry.
#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is live", body = SessionInfo),
        (status = 401, description = "Session expired or invalid", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn session(
    authenticator: Extension<Arc<Authenticator>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return denied();
    };

    match authenticator.touch_session(token).await {
        Ok(email) => Json(SessionInfo { email }).into_response(),
        Err(err) => error_response(err),
    }
}

/// Revoke the bearer session. Idempotent.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing bearer token", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn logout(
    authenticator: Extension<Arc<Authenticator>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return denied();
    };

    match authenticator.logout(token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}
