//! Admin endpoints that grant paid access.
//!
//! Payment itself happens elsewhere; these routes only record the result.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use super::storage::{PurchaseOutcome, record_purchase, set_subscription};
use super::types::{PurchaseRequest, SubscriptionRequest};
use crate::api::handlers::auth::principal::require_admin;

#[utoipa::path(
    post,
    path = "/v1/admin/purchases",
    request_body = PurchaseRequest,
    responses(
        (status = 201, description = "Purchase recorded."),
        (status = 200, description = "Purchase was already recorded."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "Unknown user or course."),
    ),
    tag = "admin"
)]
pub async fn purchase(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<PurchaseRequest>>,
) -> impl IntoResponse {
    let principal = match require_admin(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match record_purchase(&pool, request.user_id, request.course_id).await {
        Ok(PurchaseOutcome::Recorded) => {
            info!(
                user_id = %request.user_id,
                course_id = request.course_id,
                admin = %principal.user_id,
                "course purchase recorded"
            );
            StatusCode::CREATED.into_response()
        }
        Ok(PurchaseOutcome::AlreadyRecorded) => StatusCode::OK.into_response(),
        Ok(PurchaseOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to record purchase: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/admin/users/{id}/subscription",
    request_body = SubscriptionRequest,
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "Subscription updated."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "Unknown user."),
    ),
    tag = "admin"
)]
pub async fn subscription(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(user_id): Path<Uuid>,
    payload: Option<Json<SubscriptionRequest>>,
) -> impl IntoResponse {
    let principal = match require_admin(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match set_subscription(&pool, user_id, request.status).await {
        Ok(true) => {
            info!(
                user_id = %user_id,
                status = %request.status,
                admin = %principal.user_id,
                "subscription updated"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update subscription: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
