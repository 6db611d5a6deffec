//! Request/response types for course, lesson and entitlement endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{CourseIcon, LockReason, SubscriptionStatus};

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct CourseResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub icon: CourseIcon,
    pub lesson_count: i64,
    /// Whether the caller may open paid lessons of this course.
    pub paid: bool,
}

#[derive(ToSchema, Deserialize, Serialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct CourseCreateRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(ToSchema, Deserialize, Serialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct CourseUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

/// One row of a course's lesson list, evaluated for the caller.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct LessonSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub display_order: i32,
    pub is_free: bool,
    pub block_name: Option<String>,
    pub topics: Vec<String>,
    pub completed: bool,
    pub unlocked: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct CourseLessonsResponse {
    pub course_id: i64,
    pub lessons: Vec<LessonSummary>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LessonDetail {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub body: String,
    pub display_order: i32,
    pub is_free: bool,
    pub block_name: Option<String>,
    pub topics: Vec<String>,
    /// `true` once the caller has completed the lesson, including by this view.
    pub completed: bool,
}

/// Body of a 403 for a locked lesson.
#[derive(ToSchema, Serialize, Debug)]
pub struct LockedResponse {
    pub reason: LockReason,
    pub message: String,
}

#[derive(ToSchema, Deserialize, Serialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct LessonCreateRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub body: String,
    pub display_order: i32,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub block_name: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(ToSchema, Deserialize, Serialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct LessonUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub display_order: Option<i32>,
    pub is_free: Option<bool>,
    pub block_name: Option<String>,
    pub topics: Option<Vec<String>>,
}

#[derive(ToSchema, Deserialize, Serialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PurchaseRequest {
    pub user_id: Uuid,
    pub course_id: i64,
}

#[derive(ToSchema, Deserialize, Serialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionRequest {
    pub status: SubscriptionStatus,
}
