//! Canonical per-course lesson ordering.

use super::model::Lesson;

/// Lessons of one course in `display_order` ascending.
///
/// Every adjacency check ("the lesson before this one") goes through this
/// type so list pages and detail pages agree on what "previous" means.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CourseLessons {
    course_id: i64,
    lessons: Vec<Lesson>,
}

impl CourseLessons {
    /// Keep only lessons of `course_id` and sort them by `display_order`.
    ///
    /// The sort is stable, so lessons sharing an order keep their input order.
    #[must_use]
    pub fn new(course_id: i64, lessons: Vec<Lesson>) -> Self {
        let mut lessons: Vec<Lesson> = lessons
            .into_iter()
            .filter(|lesson| lesson.course_id == course_id)
            .collect();
        lessons.sort_by_key(|lesson| lesson.display_order);
        Self { course_id, lessons }
    }

    #[must_use]
    pub fn course_id(&self) -> i64 {
        self.course_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Lesson> {
        self.lessons.get(index)
    }

    /// Lesson immediately before `index`, by position.
    #[must_use]
    pub fn previous(&self, index: usize) -> Option<&Lesson> {
        index.checked_sub(1).and_then(|prev| self.lessons.get(prev))
    }

    /// Zero-based position of a lesson id within the course.
    #[must_use]
    pub fn position_of(&self, lesson_id: i64) -> Option<usize> {
        self.lessons.iter().position(|lesson| lesson.id == lesson_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lesson> {
        self.lessons.iter()
    }
}
