//! Recording lesson views as progress.
//!
//! Viewing an unlocked lesson completes it. [`record_view`] is the single
//! entry point: it decides access first and only then touches the store.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::catalog::CourseLessons;
use super::model::Learner;
use super::policy::{AccessDecision, LockReason, decide};

/// Backing store for completed lessons.
///
/// `mark_complete` must have set semantics: repeated or concurrent calls for
/// the same pair leave exactly one completion behind.
pub trait ProgressStore: Send + Sync {
    /// Returns `true` when the completion was newly inserted.
    fn mark_complete(
        &self,
        user_id: Uuid,
        lesson_id: i64,
    ) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewOutcome {
    /// Access granted and the lesson was completed by this view.
    Recorded,
    /// Access granted; the lesson was already completed.
    AlreadyCompleted,
    /// Anonymous preview; nothing to record.
    Anonymous,
    Locked(LockReason),
    NotFound,
}

impl ViewOutcome {
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(
            self,
            Self::Recorded | Self::AlreadyCompleted | Self::Anonymous
        )
    }
}

/// Check access to `lesson_id` and record the view as a completion.
///
/// # Errors
/// Returns an error only when the store fails to persist the completion.
pub async fn record_view<S: ProgressStore>(
    store: &S,
    lessons: &CourseLessons,
    learner: Option<&Learner>,
    lesson_id: i64,
) -> Result<ViewOutcome> {
    let Some(index) = lessons.position_of(lesson_id) else {
        return Ok(ViewOutcome::NotFound);
    };

    match decide(lessons, learner, index) {
        AccessDecision::Locked(reason) => Ok(ViewOutcome::Locked(reason)),
        AccessDecision::Unlocked(_) => {
            let Some(learner) = learner else {
                return Ok(ViewOutcome::Anonymous);
            };
            if learner.has_completed(lesson_id) {
                return Ok(ViewOutcome::AlreadyCompleted);
            }
            let inserted = store.mark_complete(learner.user_id, lesson_id).await?;
            debug!(user_id = %learner.user_id, lesson_id, inserted, "lesson view recorded");
            if inserted {
                Ok(ViewOutcome::Recorded)
            } else {
                Ok(ViewOutcome::AlreadyCompleted)
            }
        }
    }
}

/// In-process store, used by tests and local tooling.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    completed: Mutex<HashMap<Uuid, HashSet<i64>>>,
}

impl MemoryProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn completed(&self, user_id: Uuid) -> HashSet<i64> {
        self.completed
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl ProgressStore for MemoryProgressStore {
    async fn mark_complete(&self, user_id: Uuid, lesson_id: i64) -> Result<bool> {
        let mut completed = self.completed.lock().await;
        Ok(completed.entry(user_id).or_default().insert(lesson_id))
    }
}
