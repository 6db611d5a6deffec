//! Lesson and learner records consumed by the policy engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub body: String,
    pub display_order: i32,
    pub is_free: bool,
    pub block_name: Option<String>,
    pub topics: Vec<String>,
}

/// Global entitlement; `Premium` satisfies the paid condition of every course.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Free,
    Premium,
}

impl SubscriptionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// Progress and entitlements of a signed-in user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Learner {
    pub user_id: Uuid,
    pub completed_lessons: HashSet<i64>,
    pub paid_courses: HashSet<i64>,
    pub subscription: SubscriptionStatus,
}

impl Learner {
    #[must_use]
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_completed(mut self, lessons: impl IntoIterator<Item = i64>) -> Self {
        self.completed_lessons.extend(lessons);
        self
    }

    #[must_use]
    pub fn with_paid_courses(mut self, courses: impl IntoIterator<Item = i64>) -> Self {
        self.paid_courses.extend(courses);
        self
    }

    #[must_use]
    pub fn with_subscription(mut self, subscription: SubscriptionStatus) -> Self {
        self.subscription = subscription;
        self
    }

    #[must_use]
    pub fn has_completed(&self, lesson_id: i64) -> bool {
        self.completed_lessons.contains(&lesson_id)
    }

    #[must_use]
    pub fn is_course_paid_for(&self, course_id: i64) -> bool {
        self.subscription == SubscriptionStatus::Premium || self.paid_courses.contains(&course_id)
    }
}
