//! Course catalog, lesson access and entitlement endpoints.
//!
//! Flow Overview:
//! 1) Resolve the caller (anonymous allowed on read routes).
//! 2) Load the course's lessons in canonical order and the caller's progress.
//! 3) Let the access engine decide; lesson detail records the view.
//!
//! Write routes require an admin session.

pub mod course;
pub mod entitlements;
pub mod lesson;
pub(crate) mod storage;
pub mod types;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use tracing::error;

use super::auth::principal::optional_auth;
use crate::access::Learner;
use storage::load_learner;

/// Progress of the signed-in caller, or `None` for anonymous callers.
pub(super) async fn caller_learner(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<Learner>, Response> {
    let principal = optional_auth(headers, pool)
        .await
        .map_err(IntoResponse::into_response)?;
    let Some(principal) = principal else {
        return Ok(None);
    };
    match load_learner(pool, principal.user_id).await {
        Ok(learner) => Ok(Some(learner)),
        Err(err) => {
            error!("Failed to load learner progress: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// Trimmed, non-empty text or `None`.
pub(super) fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::normalize_optional;

    #[test]
    fn normalize_optional_drops_blank_values() {
        assert_eq!(normalize_optional(None), None);
        assert_eq!(normalize_optional(Some("   ".to_string())), None);
        assert_eq!(
            normalize_optional(Some(" Rust ".to_string())).as_deref(),
            Some("Rust")
        );
    }
}
