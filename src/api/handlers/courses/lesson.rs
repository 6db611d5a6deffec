//! Lesson listing, gated lesson detail and admin lesson management.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use tracing::{debug, error, info};

use super::caller_learner;
use super::storage::{
    PgProgressStore, WriteOutcome, course_lessons, delete_lesson, fetch_course, insert_lesson,
    lesson_course_id, update_lesson,
};
use super::types::{
    CourseLessonsResponse, LessonCreateRequest, LessonDetail, LessonSummary, LessonUpdateRequest,
    LockedResponse,
};
use crate::access::{CourseLessons, Learner, Lesson, ViewOutcome, record_view, unlock_map};
use crate::api::handlers::auth::principal::require_admin;

/// Evaluate every lesson of the course for `learner`.
pub(super) fn lesson_summaries(
    lessons: &CourseLessons,
    learner: Option<&Learner>,
) -> Vec<LessonSummary> {
    lessons
        .iter()
        .zip(unlock_map(lessons, learner))
        .map(|(lesson, unlocked)| LessonSummary {
            id: lesson.id,
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            display_order: lesson.display_order,
            is_free: lesson.is_free,
            block_name: lesson.block_name.clone(),
            topics: lesson.topics.clone(),
            completed: learner.is_some_and(|learner| learner.has_completed(lesson.id)),
            unlocked,
        })
        .collect()
}

fn lesson_detail(lesson: &Lesson, completed: bool) -> LessonDetail {
    LessonDetail {
        id: lesson.id,
        course_id: lesson.course_id,
        title: lesson.title.clone(),
        description: lesson.description.clone(),
        body: lesson.body.clone(),
        display_order: lesson.display_order,
        is_free: lesson.is_free,
        block_name: lesson.block_name.clone(),
        topics: lesson.topics.clone(),
        completed,
    }
}

#[utoipa::path(
    get,
    path = "/v1/courses/{id}/lessons",
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 200, description = "Lessons in order with unlock state for the caller.", body = CourseLessonsResponse),
        (status = 404, description = "Unknown course."),
    ),
    tag = "lessons"
)]
pub async fn list(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(course_id): Path<i64>,
) -> impl IntoResponse {
    let learner = match caller_learner(&headers, &pool).await {
        Ok(learner) => learner,
        Err(response) => return response,
    };

    match fetch_course(&pool, course_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch course: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match course_lessons(&pool, course_id).await {
        Ok(lessons) => {
            let response = CourseLessonsResponse {
                course_id,
                lessons: lesson_summaries(&lessons, learner.as_ref()),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!("Failed to load lessons: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/lessons/{id}",
    params(("id" = i64, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "Lesson content; the view completes the lesson.", body = LessonDetail),
        (status = 403, description = "Lesson is locked for the caller.", body = LockedResponse),
        (status = 404, description = "Unknown lesson."),
    ),
    tag = "lessons"
)]
pub async fn detail(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(lesson_id): Path<i64>,
) -> impl IntoResponse {
    let learner = match caller_learner(&headers, &pool).await {
        Ok(learner) => learner,
        Err(response) => return response,
    };

    let course_id = match lesson_course_id(&pool, lesson_id).await {
        Ok(Some(course_id)) => course_id,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to lookup lesson: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let lessons = match course_lessons(&pool, course_id).await {
        Ok(lessons) => lessons,
        Err(err) => {
            error!("Failed to load lessons: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let store = PgProgressStore::new(pool.0.clone());
    let outcome = match record_view(&store, &lessons, learner.as_ref(), lesson_id).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Failed to record lesson view: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    debug!(lesson_id, outcome = ?outcome, "lesson view");

    let completed = match outcome {
        ViewOutcome::Recorded | ViewOutcome::AlreadyCompleted => true,
        ViewOutcome::Anonymous => false,
        ViewOutcome::Locked(reason) => {
            let body = LockedResponse {
                reason,
                message: reason.message().to_string(),
            };
            return (StatusCode::FORBIDDEN, Json(body)).into_response();
        }
        ViewOutcome::NotFound => return StatusCode::NOT_FOUND.into_response(),
    };

    match lessons
        .position_of(lesson_id)
        .and_then(|index| lessons.get(index))
    {
        Some(lesson) => (StatusCode::OK, Json(lesson_detail(lesson, completed))).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/courses/{id}/lessons",
    request_body = LessonCreateRequest,
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 201, description = "Lesson created.", body = LessonDetail),
        (status = 400, description = "Missing title."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "Unknown course."),
        (status = 409, description = "Display order already used in this course."),
    ),
    tag = "lessons"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(course_id): Path<i64>,
    payload: Option<Json<LessonCreateRequest>>,
) -> impl IntoResponse {
    let principal = match require_admin(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    let Some(Json(mut request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    request.title = request.title.trim().to_string();
    if request.title.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing title".to_string()).into_response();
    }

    match insert_lesson(&pool, course_id, &request).await {
        Ok(WriteOutcome::Done(lesson)) => {
            info!(lesson_id = lesson.id, course_id, admin = %principal.user_id, "lesson created");
            (StatusCode::CREATED, Json(lesson_detail(&lesson, false))).into_response()
        }
        Ok(WriteOutcome::Conflict) => display_order_conflict(),
        Ok(WriteOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to create lesson: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/lessons/{id}",
    request_body = LessonUpdateRequest,
    params(("id" = i64, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "Lesson updated.", body = LessonDetail),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "Unknown lesson."),
        (status = 409, description = "Display order already used in this course."),
    ),
    tag = "lessons"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(lesson_id): Path<i64>,
    payload: Option<Json<LessonUpdateRequest>>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &pool).await {
        return status.into_response();
    }
    let Some(Json(mut request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if let Some(title) = request.title.as_mut() {
        *title = title.trim().to_string();
        if title.is_empty() {
            return (StatusCode::BAD_REQUEST, "Missing title".to_string()).into_response();
        }
    }

    match update_lesson(&pool, lesson_id, &request).await {
        Ok(WriteOutcome::Done(lesson)) => {
            (StatusCode::OK, Json(lesson_detail(&lesson, false))).into_response()
        }
        Ok(WriteOutcome::Conflict) => display_order_conflict(),
        Ok(WriteOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update lesson: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/lessons/{id}",
    params(("id" = i64, Path, description = "Lesson id")),
    responses(
        (status = 204, description = "Lesson deleted."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "Unknown lesson."),
    ),
    tag = "lessons"
)]
pub async fn remove(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(lesson_id): Path<i64>,
) -> impl IntoResponse {
    if let Err(status) = require_admin(&headers, &pool).await {
        return status.into_response();
    }

    match delete_lesson(&pool, lesson_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete lesson: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn display_order_conflict() -> axum::response::Response {
    (
        StatusCode::CONFLICT,
        "Another lesson in this course already uses this display order".to_string(),
    )
        .into_response()
}
