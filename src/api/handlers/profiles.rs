//! Profile existence lookup used by the email step of sign-in.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;

use super::auth::storage::profile_exists;
use crate::flow::validation::{normalize_email, valid_email};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileLookupRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileLookupResponse {
    /// `true` once a credential has been set for the address.
    pub exists: bool,
}

#[utoipa::path(
    post,
    path = "/v1/profiles/lookup",
    request_body = ProfileLookupRequest,
    responses(
        (status = 200, description = "Whether a profile exists for the email.", body = ProfileLookupResponse),
        (status = 400, description = "Invalid email.", body = String),
    ),
    tag = "profiles"
)]
pub async fn lookup(
    pool: Extension<PgPool>,
    payload: Option<Json<ProfileLookupRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    match profile_exists(&pool, &email).await {
        Ok(exists) => (StatusCode::OK, Json(ProfileLookupResponse { exists })).into_response(),
        Err(err) => {
            error!("Failed to lookup profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
