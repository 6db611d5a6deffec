//! Lesson access policy and progression.
//!
//! Unlock status is a derived view: it is recomputed from the learner's
//! completed lessons, purchases and subscription every time it is needed and
//! is never persisted.
//!
//! ## Rules
//!
//! Evaluated in order, first match wins:
//!
//! 1. Anonymous callers only see the first lesson of a course.
//! 2. Course not paid for: paid lessons are locked; a free lesson is unlocked
//!    when it is first or when the lesson right before it is completed.
//! 3. Course paid for (per-course purchase or premium subscription): the first
//!    lesson is unlocked; any other lesson is unlocked when the lesson right
//!    before it is completed or when it was already completed itself.
//!
//! Adjacency is positional within [`CourseLessons`], the canonical per-course
//! ordering by `display_order`.

mod catalog;
mod icon;
mod model;
mod policy;
mod progress;

pub use catalog::CourseLessons;
pub use icon::CourseIcon;
pub use model::{Learner, Lesson, SubscriptionStatus};
pub use policy::{
    AccessDecision, LockReason, UnlockReason, decide, is_lesson_unlocked, unlock_map,
};
pub use progress::{MemoryProgressStore, ProgressStore, ViewOutcome, record_view};
