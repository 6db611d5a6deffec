//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via a full session.
//! 2) Read or update the caller's own rows.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{Instrument, error};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::principal::require_auth;
use super::courses::storage::load_learner;
use crate::access::{Learner, SubscriptionStatus};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdateRequest {
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    pub completed_lessons: Vec<i64>,
    pub paid_courses: Vec<i64>,
    pub subscription: SubscriptionStatus,
}

impl From<Learner> for ProgressResponse {
    fn from(learner: Learner) -> Self {
        let mut completed_lessons: Vec<i64> = learner.completed_lessons.into_iter().collect();
        completed_lessons.sort_unstable();
        let mut paid_courses: Vec<i64> = learner.paid_courses.into_iter().collect();
        paid_courses.sort_unstable();
        Self {
            completed_lessons,
            paid_courses,
            subscription: learner.subscription,
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/me/profile",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile saved.", body = ProfileResponse),
        (status = 400, description = "Missing display name."),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "me"
)]
pub async fn put_profile(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ProfileUpdateRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing display name".to_string()).into_response();
    }

    match update_display_name(&pool, principal.user_id, display_name).await {
        Ok(Some(display_name)) => {
            let response = ProfileResponse {
                user_id: principal.user_id.to_string(),
                email: principal.email,
                display_name,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/progress",
    responses(
        (status = 200, description = "Completed lessons and entitlements.", body = ProgressResponse),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "me"
)]
pub async fn get_progress(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match load_learner(&pool, principal.user_id).await {
        Ok(learner) => (StatusCode::OK, Json(ProgressResponse::from(learner))).into_response(),
        Err(err) => {
            error!("Failed to load progress: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Returns the stored name, or `None` when the user row is gone.
async fn update_display_name(
    pool: &PgPool,
    user_id: Uuid,
    display_name: &str,
) -> anyhow::Result<Option<Option<String>>> {
    let query = r"
        UPDATE users
        SET display_name = $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING display_name
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(display_name)
        .fetch_optional(pool)
        .instrument(span)
        .await?;
    Ok(row.map(|row| row.get("display_name")))
}
