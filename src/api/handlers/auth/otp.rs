//! One-time code endpoints.
//!
//! Flow Overview:
//! 1) `POST /v1/auth/otp` stores a hashed code and enqueues the email.
//! 2) `POST /v1/auth/otp/verify` consumes the code and returns an `otp`
//!    session that can only be used to set or check a password.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::session_cookie_headers;
use super::session_kind::SessionKind;
use super::state::AuthState;
use super::storage::{CodeCheck, consume_one_time_code, insert_session, issue_one_time_code};
use super::types::{OtpRequest, OtpVerifyRequest, OtpVerifyResponse};
use super::utils::extract_client_ip;
use crate::flow::is_valid_code;
use crate::flow::validation::{normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/v1/auth/otp",
    request_body = OtpRequest,
    responses(
        (status = 204, description = "Code issued and email queued"),
        (status = 400, description = "Invalid email", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn request_code(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<OtpRequest>>,
) -> impl IntoResponse {
    let request: OtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if is_limited(&auth_state, &headers, &email, RateLimitAction::RequestCode).await {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    match issue_one_time_code(&pool, &email, auth_state.config()).await {
        Ok(()) => {
            info!(email = %email, "one-time code issued");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to issue one-time code: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send code".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/otp/verify",
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Code accepted, otp session issued", body = OtpVerifyResponse),
        (status = 400, description = "Malformed, invalid or expired code", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_code(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<OtpVerifyRequest>>,
) -> impl IntoResponse {
    let request: OtpVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    let code = request.code.trim();
    // Malformed input never reaches the database.
    if !valid_email(&email) || !is_valid_code(code) {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid or expired code".to_string(),
        )
            .into_response();
    }

    if is_limited(&auth_state, &headers, &email, RateLimitAction::VerifyCode).await {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let user = match consume_one_time_code(&pool, &email, code).await {
        Ok(CodeCheck::Verified(user)) => user,
        Ok(CodeCheck::Rejected { retired }) => {
            if retired {
                warn!(email = %email, "one-time code retired after repeated wrong guesses");
            }
            return (
                StatusCode::BAD_REQUEST,
                "Invalid or expired code".to_string(),
            )
                .into_response();
        }
        Ok(CodeCheck::Missing) => {
            return (
                StatusCode::BAD_REQUEST,
                "Invalid or expired code".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to verify one-time code: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    let ttl_seconds = auth_state.config().otp_session_ttl_seconds();
    let token = match insert_session(&pool, user.user_id, SessionKind::Otp, ttl_seconds).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create otp session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    info!(user_id = %user.user_id, has_password = user.has_password, "one-time code verified");
    let response_headers = session_cookie_headers(auth_state.config(), &token, ttl_seconds);
    let response = OtpVerifyResponse {
        session_token: token,
        user_id: user.user_id.to_string(),
        email: user.email,
        has_password: user.has_password,
    };
    (StatusCode::OK, response_headers, Json(response)).into_response()
}

/// Registers the attempt; either the email or the IP window can deny it.
pub(super) async fn is_limited(
    auth_state: &AuthState,
    headers: &HeaderMap,
    email: &str,
    action: RateLimitAction,
) -> bool {
    let client_ip = extract_client_ip(headers);
    auth_state
        .rate_limiter()
        .register_attempt(action, email, client_ip.as_deref())
        .await
        == RateLimitDecision::Limited
}
