//! Course listing and admin course management.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use tracing::{error, info};

use super::storage::{CourseRow, delete_course, insert_course, list_courses, update_course};
use super::types::{CourseCreateRequest, CourseResponse, CourseUpdateRequest};
use super::{caller_learner, normalize_optional};
use crate::access::{CourseIcon, Learner};
use crate::api::handlers::auth::principal::require_admin;

pub(super) fn course_response(row: CourseRow, learner: Option<&Learner>) -> CourseResponse {
    CourseResponse {
        paid: learner.is_some_and(|learner| learner.is_course_paid_for(row.id)),
        id: row.id,
        title: row.title,
        description: row.description,
        icon: CourseIcon::from_name(&row.icon),
        lesson_count: row.lesson_count,
    }
}

#[utoipa::path(
    get,
    path = "/v1/courses",
    responses(
        (status = 200, description = "Courses with the caller's purchase state.", body = [CourseResponse]),
    ),
    tag = "courses"
)]
pub async fn list(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let learner = match caller_learner(&headers, &pool).await {
        Ok(learner) => learner,
        Err(response) => return response,
    };

    match list_courses(&pool).await {
        Ok(rows) => {
            let courses: Vec<CourseResponse> = rows
                .into_iter()
                .map(|row| course_response(row, learner.as_ref()))
                .collect();
            (StatusCode::OK, Json(courses)).into_response()
        }
        Err(err) => {
            error!("Failed to list courses: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/courses",
    request_body = CourseCreateRequest,
    responses(
        (status = 201, description = "Course created.", body = CourseResponse),
        (status = 400, description = "Missing title."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
    ),
    tag = "courses"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CourseCreateRequest>>,
) -> impl IntoResponse {
    let principal = match require_admin(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let title = request.title.trim();
    if title.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing title".to_string()).into_response();
    }
    let icon = CourseIcon::from_name(request.icon.as_deref().unwrap_or_default());

    match insert_course(&pool, title, request.description.trim(), icon.as_str()).await {
        Ok(row) => {
            info!(course_id = row.id, admin = %principal.user_id, "course created");
            (StatusCode::CREATED, Json(course_response(row, None))).into_response()
        }
        Err(err) => {
            error!("Failed to create course: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/courses/{id}",
    request_body = CourseUpdateRequest,
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course updated.", body = CourseResponse),
        (status = 400, description = "No updates provided."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "Unknown course."),
    ),
    tag = "courses"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(course_id): Path<i64>,
    payload: Option<Json<CourseUpdateRequest>>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &pool).await {
        return status.into_response();
    }
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let update = CourseUpdateRequest {
        title: normalize_optional(request.title),
        description: request.description.map(|value| value.trim().to_string()),
        icon: normalize_optional(request.icon)
            .map(|name| CourseIcon::from_name(&name).as_str().to_string()),
    };
    if update.title.is_none() && update.description.is_none() && update.icon.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided".to_string()).into_response();
    }

    match update_course(&pool, course_id, &update).await {
        Ok(Some(row)) => (StatusCode::OK, Json(course_response(row, None))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update course: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/courses/{id}",
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 204, description = "Course and its lessons deleted."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "Unknown course."),
    ),
    tag = "courses"
)]
pub async fn remove(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(course_id): Path<i64>,
) -> impl IntoResponse {
    let principal = match require_admin(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match delete_course(&pool, course_id).await {
        Ok(true) => {
            info!(course_id, admin = %principal.user_id, "course deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete course: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn row(id: i64, icon: &str) -> CourseRow {
        CourseRow {
            id,
            title: "Rust".to_string(),
            description: String::new(),
            icon: icon.to_string(),
            lesson_count: 4,
        }
    }

    #[test]
    fn course_response_marks_paid_courses() {
        let learner = Learner::new(Uuid::nil()).with_paid_courses(HashSet::from([7]));
        assert!(course_response(row(7, "code"), Some(&learner)).paid);
        assert!(!course_response(row(8, "code"), Some(&learner)).paid);
        assert!(!course_response(row(7, "code"), None).paid);
    }

    #[test]
    fn course_response_maps_unknown_icons_to_book() {
        assert_eq!(course_response(row(1, "rocket"), None).icon, CourseIcon::Rocket);
        assert_eq!(course_response(row(1, "unicorn"), None).icon, CourseIcon::Book);
    }

    #[tokio::test]
    async fn create_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = create(
            HeaderMap::new(),
            Extension(pool),
            Some(Json(CourseCreateRequest {
                title: "Rust".to_string(),
                description: String::new(),
                icon: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn remove_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = remove(HeaderMap::new(), Extension(pool), Path(1))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
