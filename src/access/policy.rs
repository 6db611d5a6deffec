//! Unlock decisions for a single lesson or a whole course.

use serde::Serialize;
use utoipa::ToSchema;

use super::catalog::CourseLessons;
use super::model::Learner;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnlockReason {
    /// Anonymous preview of the first lesson.
    Preview,
    FirstLesson,
    PreviousCompleted,
    /// Completed lessons stay open even when their gate is not satisfied.
    AlreadyCompleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    SignInRequired,
    PurchaseRequired,
    PreviousIncomplete,
    OutOfRange,
}

impl LockReason {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SignInRequired => "Sign in to continue this course",
            Self::PurchaseRequired => "Purchase this course to unlock the lesson",
            Self::PreviousIncomplete => "Complete the previous lesson first",
            Self::OutOfRange => "Lesson not found",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Unlocked(UnlockReason),
    Locked(LockReason),
}

impl AccessDecision {
    #[must_use]
    pub const fn is_unlocked(self) -> bool {
        matches!(self, Self::Unlocked(_))
    }
}

/// Decide whether the lesson at `index` is open to `learner`.
///
/// `None` means an anonymous caller. An index past the end is locked.
#[must_use]
pub fn decide(lessons: &CourseLessons, learner: Option<&Learner>, index: usize) -> AccessDecision {
    let Some(target) = lessons.get(index) else {
        return AccessDecision::Locked(LockReason::OutOfRange);
    };

    let Some(learner) = learner else {
        return if index == 0 {
            AccessDecision::Unlocked(UnlockReason::Preview)
        } else {
            AccessDecision::Locked(LockReason::SignInRequired)
        };
    };

    let previous_completed = lessons
        .previous(index)
        .is_some_and(|previous| learner.has_completed(previous.id));

    if !learner.is_course_paid_for(lessons.course_id()) {
        if !target.is_free {
            return AccessDecision::Locked(LockReason::PurchaseRequired);
        }
        if index == 0 {
            return AccessDecision::Unlocked(UnlockReason::FirstLesson);
        }
        return if previous_completed {
            AccessDecision::Unlocked(UnlockReason::PreviousCompleted)
        } else {
            AccessDecision::Locked(LockReason::PreviousIncomplete)
        };
    }

    if index == 0 {
        AccessDecision::Unlocked(UnlockReason::FirstLesson)
    } else if previous_completed {
        AccessDecision::Unlocked(UnlockReason::PreviousCompleted)
    } else if learner.has_completed(target.id) {
        AccessDecision::Unlocked(UnlockReason::AlreadyCompleted)
    } else {
        AccessDecision::Locked(LockReason::PreviousIncomplete)
    }
}

#[must_use]
pub fn is_lesson_unlocked(lessons: &CourseLessons, learner: Option<&Learner>, index: usize) -> bool {
    decide(lessons, learner, index).is_unlocked()
}

/// Unlock flag for every lesson of the course, in canonical order.
#[must_use]
pub fn unlock_map(lessons: &CourseLessons, learner: Option<&Learner>) -> Vec<bool> {
    (0..lessons.len())
        .map(|index| is_lesson_unlocked(lessons, learner, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::catalog::tests::lesson;
    use super::super::model::SubscriptionStatus;
    use super::*;
    use uuid::Uuid;

    const COURSE: i64 = 1;

    fn course(free: &[bool]) -> CourseLessons {
        let lessons = free
            .iter()
            .enumerate()
            .map(|(i, &is_free)| {
                let order = i32::try_from(i).unwrap_or(i32::MAX);
                lesson(100 + i64::from(order), COURSE, order, is_free)
            })
            .collect();
        CourseLessons::new(COURSE, lessons)
    }

    fn id_at(course: &CourseLessons, index: usize) -> i64 {
        course.get(index).map_or(-1, |l| l.id)
    }

    #[test]
    fn anonymous_sees_only_first_lesson() {
        let course = course(&[true, false, true, false, false]);
        assert_eq!(
            unlock_map(&course, None),
            vec![true, false, false, false, false]
        );
        assert_eq!(
            decide(&course, None, 0),
            AccessDecision::Unlocked(UnlockReason::Preview)
        );
        assert_eq!(
            decide(&course, None, 2),
            AccessDecision::Locked(LockReason::SignInRequired)
        );
    }

    #[test]
    fn anonymous_rule_holds_for_every_shape() {
        for len in 1..=6usize {
            for mask in 0..(1u32 << len) {
                let free: Vec<bool> = (0..len).map(|bit| mask & (1 << bit) != 0).collect();
                let course = course(&free);
                let map = unlock_map(&course, None);
                assert!(map[0]);
                assert!(map.iter().skip(1).all(|unlocked| !unlocked));
            }
        }
    }

    #[test]
    fn unpaid_learner_never_opens_paid_lessons() {
        let course = course(&[false, false, true, false]);
        let everything = (0..4).map(|i| id_at(&course, i));
        let learner = Learner::new(Uuid::nil()).with_completed(everything);
        for index in [0, 1, 3] {
            assert_eq!(
                decide(&course, Some(&learner), index),
                AccessDecision::Locked(LockReason::PurchaseRequired)
            );
        }
    }

    #[test]
    fn unpaid_free_lesson_follows_previous_completion() {
        let course = course(&[true, true, true, true]);
        for completed_mask in 0..16u32 {
            let completed = (0..4)
                .filter(|bit| completed_mask & (1 << bit) != 0)
                .map(|bit| id_at(&course, bit));
            let learner = Learner::new(Uuid::nil()).with_completed(completed);
            for index in 1..4 {
                let expected = learner.has_completed(id_at(&course, index - 1));
                assert_eq!(is_lesson_unlocked(&course, Some(&learner), index), expected);
            }
        }
    }

    #[test]
    fn unpaid_completed_lesson_does_not_reopen_itself() {
        let course = course(&[true, true]);
        let learner = Learner::new(Uuid::nil()).with_completed([id_at(&course, 1)]);
        assert!(!is_lesson_unlocked(&course, Some(&learner), 1));
    }

    #[test]
    fn paid_first_lesson_always_open() {
        let course = course(&[false, false, false]);
        let purchased = Learner::new(Uuid::nil()).with_paid_courses([COURSE]);
        let premium = Learner::new(Uuid::nil()).with_subscription(SubscriptionStatus::Premium);
        assert!(is_lesson_unlocked(&course, Some(&purchased), 0));
        assert!(is_lesson_unlocked(&course, Some(&premium), 0));
    }

    #[test]
    fn paid_completed_lesson_can_be_revisited() {
        let course = course(&[false, false, false, false]);
        let learner = Learner::new(Uuid::nil())
            .with_paid_courses([COURSE])
            .with_completed([id_at(&course, 3)]);
        assert_eq!(
            decide(&course, Some(&learner), 3),
            AccessDecision::Unlocked(UnlockReason::AlreadyCompleted)
        );
        assert_eq!(
            decide(&course, Some(&learner), 2),
            AccessDecision::Locked(LockReason::PreviousIncomplete)
        );
    }

    #[test]
    fn purchase_of_another_course_does_not_count() {
        let course = course(&[false, false]);
        let learner = Learner::new(Uuid::nil()).with_paid_courses([COURSE + 1]);
        assert_eq!(unlock_map(&course, Some(&learner)), vec![false, false]);
    }

    #[test]
    fn out_of_range_is_locked() {
        let course = course(&[true]);
        let learner = Learner::new(Uuid::nil()).with_subscription(SubscriptionStatus::Premium);
        assert_eq!(
            decide(&course, Some(&learner), 5),
            AccessDecision::Locked(LockReason::OutOfRange)
        );
        assert!(!is_lesson_unlocked(&course, None, 1));
    }

    #[test]
    fn empty_course_has_nothing_to_unlock() {
        let course = CourseLessons::new(COURSE, Vec::new());
        assert!(unlock_map(&course, None).is_empty());
        assert!(!is_lesson_unlocked(&course, None, 0));
    }

    #[test]
    fn scenario_anonymous_five_lessons() {
        let course = course(&[true, false, true, false, false]);
        assert_eq!(
            unlock_map(&course, None),
            vec![true, false, false, false, false]
        );
    }

    #[test]
    fn scenario_unpaid_with_first_completed() {
        let course = course(&[true, true, false, false, false]);
        let learner = Learner::new(Uuid::nil()).with_completed([id_at(&course, 0)]);
        assert_eq!(
            unlock_map(&course, Some(&learner)),
            vec![true, true, false, false, false]
        );
    }

    #[test]
    fn scenario_paid_nothing_completed() {
        let course = course(&[true, true, false, false, false]);
        let learner = Learner::new(Uuid::nil()).with_paid_courses([COURSE]);
        assert_eq!(
            unlock_map(&course, Some(&learner)),
            vec![true, false, false, false, false]
        );
    }

    #[test]
    fn scenario_paid_first_two_completed() {
        let course = course(&[true, true, false, false, false]);
        let learner = Learner::new(Uuid::nil())
            .with_paid_courses([COURSE])
            .with_completed([id_at(&course, 0), id_at(&course, 1)]);
        assert_eq!(
            unlock_map(&course, Some(&learner)),
            vec![true, true, true, false, false]
        );
    }

    #[test]
    fn lock_reasons_have_messages() {
        assert_eq!(
            LockReason::PreviousIncomplete.message(),
            "Complete the previous lesson first"
        );
    }
}
