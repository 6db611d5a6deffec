//! Authenticated principal extraction and authorization helpers.
//!
//! Only full sessions produce a principal; `otp` sessions are limited to the
//! credential endpoints and are treated as signed out everywhere else.

use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use uuid::Uuid;

use super::session::authenticate_session;
use super::session_kind::SessionKind;

/// Authenticated user context derived from the session token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

/// Resolve the session into a principal, or return 401.
pub async fn require_auth(headers: &HeaderMap, pool: &PgPool) -> Result<Principal, StatusCode> {
    match optional_auth(headers, pool).await {
        Ok(Some(principal)) => Ok(principal),
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(status) => Err(status),
    }
}

/// 401 without a session, 403 for a signed-in non-admin.
pub async fn require_admin(headers: &HeaderMap, pool: &PgPool) -> Result<Principal, StatusCode> {
    let principal = require_auth(headers, pool).await?;
    if principal.is_admin {
        Ok(principal)
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

/// Anonymous callers are allowed; an unknown token is the same as none.
pub async fn optional_auth(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<Principal>, StatusCode> {
    let session = authenticate_session(headers, pool).await?;
    Ok(session
        .filter(|session| session.kind == SessionKind::Full)
        .map(|session| Principal {
            user_id: session.record.user_id,
            email: session.record.email,
            is_admin: session.record.is_admin,
        }))
}
