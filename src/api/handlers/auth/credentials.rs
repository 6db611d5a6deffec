//! Password sign-in and credential updates.
//!
//! Both endpoints sit behind a code verification: password sign-in needs the
//! `otp` session issued for the same address, and setting a password needs
//! any session. Success always ends with a full session.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::otp::is_limited;
use super::password::{hash_password, verify_password};
use super::rate_limit::RateLimitAction;
use super::session::{authenticate_session, retire_session, session_cookie_headers};
use super::session_kind::SessionKind;
use super::state::AuthState;
use super::storage::{SessionRecord, insert_session, lookup_password_hash, store_password_hash};
use super::types::{LoginRequest, SetPasswordRequest, TokenResponse};
use crate::flow::validation::{check_password, normalize_email};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 400, description = "Missing password", body = String),
        (status = 401, description = "No verified code for this email or wrong password", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let email = normalize_email(&request.email);
    let session = match authenticate_session(&headers, &pool).await {
        Ok(Some(session)) if session.kind == SessionKind::Otp && session.record.email == email => {
            session
        }
        Ok(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                "Verify your email with a one-time code first".to_string(),
            )
                .into_response();
        }
        Err(status) => return status.into_response(),
    };

    // Only attempts on a code-verified session are counted.
    if is_limited(&auth_state, &headers, &email, RateLimitAction::Login).await {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let stored_hash = match lookup_password_hash(&pool, session.record.user_id).await {
        Ok(Some(hash)) => hash,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Incorrect password".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to lookup password hash: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response();
        }
    };

    match verify_password(&request.password, &stored_hash) {
        Ok(true) => {}
        Ok(false) => {
            warn!(user_id = %session.record.user_id, "password sign-in rejected");
            return (StatusCode::UNAUTHORIZED, "Incorrect password".to_string()).into_response();
        }
        Err(err) => {
            error!("Stored password hash is unreadable: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response();
        }
    }

    info!(user_id = %session.record.user_id, "password sign-in");
    issue_full_session(&pool, &auth_state, &session.token, session.record).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password set, otp session upgraded", body = TokenResponse),
        (status = 204, description = "Password changed on a full session"),
        (status = 400, description = "Password too short", body = String),
        (status = 401, description = "No session")
    ),
    tag = "auth"
)]
pub async fn set_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SetPasswordRequest>>,
) -> impl IntoResponse {
    let request: SetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Err(err) = check_password(&request.password) {
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    }

    let session = match authenticate_session(&headers, &pool).await {
        Ok(Some(session)) => session,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(status) => return status.into_response(),
    };

    let hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to set password".to_string(),
            )
                .into_response();
        }
    };

    if let Err(err) = store_password_hash(&pool, session.record.user_id, &hash).await {
        error!("Failed to store password: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to set password".to_string(),
        )
            .into_response();
    }

    info!(user_id = %session.record.user_id, kind = ?session.kind, "password set");
    match session.kind {
        SessionKind::Full => StatusCode::NO_CONTENT.into_response(),
        SessionKind::Otp => {
            issue_full_session(&pool, &auth_state, &session.token, session.record).await
        }
    }
}

/// Replace the `otp` session with a full one.
async fn issue_full_session(
    pool: &PgPool,
    auth_state: &AuthState,
    otp_token: &str,
    record: SessionRecord,
) -> axum::response::Response {
    let ttl_seconds = auth_state.config().session_ttl_seconds();
    let token = match insert_session(pool, record.user_id, SessionKind::Full, ttl_seconds).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
                .into_response();
        }
    };
    retire_session(pool, otp_token).await;

    let response_headers = session_cookie_headers(auth_state.config(), &token, ttl_seconds);
    let response = TokenResponse {
        session_token: token,
        user_id: record.user_id.to_string(),
        email: record.email,
    };
    (StatusCode::OK, response_headers, Json(response)).into_response()
}
