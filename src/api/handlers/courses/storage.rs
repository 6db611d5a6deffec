//! Database helpers for courses, lessons, progress and entitlements.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::collections::HashSet;
use tracing::Instrument;
use uuid::Uuid;

use super::types::{CourseUpdateRequest, LessonCreateRequest, LessonUpdateRequest};
use crate::access::{CourseLessons, Learner, Lesson, ProgressStore, SubscriptionStatus};
use crate::api::handlers::auth::is_unique_violation;

const LESSON_COLUMNS: &str =
    "id, course_id, title, description, body, display_order, is_free, block_name, topics";

#[derive(Debug, Clone)]
pub(super) struct CourseRow {
    pub(super) id: i64,
    pub(super) title: String,
    pub(super) description: String,
    pub(super) icon: String,
    pub(super) lesson_count: i64,
}

/// Result of a write that can hit a uniqueness or existence constraint.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum WriteOutcome<T> {
    Done(T),
    /// Another lesson of the course already uses this `display_order`.
    Conflict,
    NotFound,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum PurchaseOutcome {
    Recorded,
    AlreadyRecorded,
    NotFound,
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23503"),
        _ => false,
    }
}

fn course_from_row(row: &PgRow) -> CourseRow {
    CourseRow {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        icon: row.get("icon"),
        lesson_count: row.get("lesson_count"),
    }
}

fn lesson_from_row(row: &PgRow) -> Lesson {
    Lesson {
        id: row.get("id"),
        course_id: row.get("course_id"),
        title: row.get("title"),
        description: row.get("description"),
        body: row.get("body"),
        display_order: row.get("display_order"),
        is_free: row.get("is_free"),
        block_name: row.get("block_name"),
        topics: row.get("topics"),
    }
}

pub(super) async fn list_courses(pool: &PgPool) -> Result<Vec<CourseRow>> {
    let query = r"
        SELECT courses.id, courses.title, courses.description, courses.icon,
               COUNT(lessons.id) AS lesson_count
        FROM courses
        LEFT JOIN lessons ON lessons.course_id = courses.id
        GROUP BY courses.id
        ORDER BY courses.id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list courses")?;
    Ok(rows.iter().map(course_from_row).collect())
}

pub(super) async fn fetch_course(pool: &PgPool, course_id: i64) -> Result<Option<CourseRow>> {
    let query = r"
        SELECT courses.id, courses.title, courses.description, courses.icon,
               COUNT(lessons.id) AS lesson_count
        FROM courses
        LEFT JOIN lessons ON lessons.course_id = courses.id
        WHERE courses.id = $1
        GROUP BY courses.id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(course_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch course")?;
    Ok(row.as_ref().map(course_from_row))
}

pub(super) async fn insert_course(
    pool: &PgPool,
    title: &str,
    description: &str,
    icon: &str,
) -> Result<CourseRow> {
    let query = r"
        INSERT INTO courses (title, description, icon)
        VALUES ($1, $2, $3)
        RETURNING id, title, description, icon, 0::BIGINT AS lesson_count
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(title)
        .bind(description)
        .bind(icon)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert course")?;
    Ok(course_from_row(&row))
}

pub(super) async fn update_course(
    pool: &PgPool,
    course_id: i64,
    update: &CourseUpdateRequest,
) -> Result<Option<CourseRow>> {
    let query = r"
        UPDATE courses
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            icon = COALESCE($4, icon),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(course_id)
        .bind(update.title.as_deref())
        .bind(update.description.as_deref())
        .bind(update.icon.as_deref())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update course")?;

    if row.is_none() {
        return Ok(None);
    }
    fetch_course(pool, course_id).await
}

/// Lessons, completions and purchases of the course go with it.
pub(super) async fn delete_course(pool: &PgPool, course_id: i64) -> Result<bool> {
    let query = "DELETE FROM courses WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(course_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete course")?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn course_lessons(pool: &PgPool, course_id: i64) -> Result<CourseLessons> {
    let query = format!(
        "SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = $1 ORDER BY display_order, id"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(course_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load course lessons")?;
    let lessons = rows.iter().map(lesson_from_row).collect();
    Ok(CourseLessons::new(course_id, lessons))
}

pub(super) async fn lesson_course_id(pool: &PgPool, lesson_id: i64) -> Result<Option<i64>> {
    let query = "SELECT course_id FROM lessons WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(lesson_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup lesson course")?;
    Ok(row.map(|row| row.get("course_id")))
}

pub(super) async fn insert_lesson(
    pool: &PgPool,
    course_id: i64,
    request: &LessonCreateRequest,
) -> Result<WriteOutcome<Lesson>> {
    let query = format!(
        r"
        INSERT INTO lessons
            (course_id, title, description, body, display_order, is_free, block_name, topics)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {LESSON_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let result = sqlx::query(&query)
        .bind(course_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.body)
        .bind(request.display_order)
        .bind(request.is_free)
        .bind(request.block_name.as_deref())
        .bind(&request.topics)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match result {
        Ok(row) => Ok(WriteOutcome::Done(lesson_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(WriteOutcome::Conflict),
        Err(err) if is_foreign_key_violation(&err) => Ok(WriteOutcome::NotFound),
        Err(err) => Err(err).context("failed to insert lesson"),
    }
}

pub(super) async fn update_lesson(
    pool: &PgPool,
    lesson_id: i64,
    request: &LessonUpdateRequest,
) -> Result<WriteOutcome<Lesson>> {
    let query = format!(
        r"
        UPDATE lessons
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            body = COALESCE($4, body),
            display_order = COALESCE($5, display_order),
            is_free = COALESCE($6, is_free),
            block_name = COALESCE($7, block_name),
            topics = COALESCE($8, topics),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {LESSON_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let result = sqlx::query(&query)
        .bind(lesson_id)
        .bind(request.title.as_deref())
        .bind(request.description.as_deref())
        .bind(request.body.as_deref())
        .bind(request.display_order)
        .bind(request.is_free)
        .bind(request.block_name.as_deref())
        .bind(request.topics.as_deref())
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match result {
        Ok(Some(row)) => Ok(WriteOutcome::Done(lesson_from_row(&row))),
        Ok(None) => Ok(WriteOutcome::NotFound),
        Err(err) if is_unique_violation(&err) => Ok(WriteOutcome::Conflict),
        Err(err) => Err(err).context("failed to update lesson"),
    }
}

pub(super) async fn delete_lesson(pool: &PgPool, lesson_id: i64) -> Result<bool> {
    let query = "DELETE FROM lessons WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(lesson_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete lesson")?;
    Ok(result.rows_affected() > 0)
}

/// Completions, purchases and subscription of a user.
pub(crate) async fn load_learner(pool: &PgPool, user_id: Uuid) -> Result<Learner> {
    let query = "SELECT subscription_status FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load subscription status")?;
    // Unknown values are treated as the free tier.
    let subscription = row
        .map(|row| row.get::<String, _>("subscription_status"))
        .and_then(|status| status.parse::<SubscriptionStatus>().ok())
        .unwrap_or_default();

    let query = "SELECT lesson_id FROM lesson_completions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let completed: HashSet<i64> = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load completed lessons")?
        .iter()
        .map(|row| row.get("lesson_id"))
        .collect();

    let query = "SELECT course_id FROM course_purchases WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let paid: HashSet<i64> = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load course purchases")?
        .iter()
        .map(|row| row.get("course_id"))
        .collect();

    Ok(Learner::new(user_id)
        .with_completed(completed)
        .with_paid_courses(paid)
        .with_subscription(subscription))
}

pub(super) async fn record_purchase(
    pool: &PgPool,
    user_id: Uuid,
    course_id: i64,
) -> Result<PurchaseOutcome> {
    let query = r"
        INSERT INTO course_purchases (user_id, course_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, course_id) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(course_id)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(done) if done.rows_affected() > 0 => Ok(PurchaseOutcome::Recorded),
        Ok(_) => Ok(PurchaseOutcome::AlreadyRecorded),
        Err(err) if is_foreign_key_violation(&err) => Ok(PurchaseOutcome::NotFound),
        Err(err) => Err(err).context("failed to record purchase"),
    }
}

pub(super) async fn set_subscription(
    pool: &PgPool,
    user_id: Uuid,
    status: SubscriptionStatus,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET subscription_status = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(status.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update subscription")?;
    Ok(result.rows_affected() > 0)
}

/// Completions in `lesson_completions`; the primary key gives set semantics.
#[derive(Clone, Debug)]
pub(crate) struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProgressStore for PgProgressStore {
    async fn mark_complete(&self, user_id: Uuid, lesson_id: i64) -> Result<bool> {
        let query = r"
            INSERT INTO lesson_completions (user_id, lesson_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, lesson_id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(lesson_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record lesson completion")?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::{PgProgressStore, PurchaseOutcome, WriteOutcome, load_learner};
    use crate::access::ProgressStore;
    use crate::test_support::{ensure_container_runtime, get_test_pool};
    use anyhow::Result;
    use uuid::Uuid;

    #[test]
    fn write_outcome_compares_payloads() {
        assert_eq!(WriteOutcome::Done(3), WriteOutcome::Done(3));
        assert_ne!(WriteOutcome::Done(3), WriteOutcome::Conflict);
        assert_eq!(format!("{:?}", WriteOutcome::<()>::NotFound), "NotFound");
    }

    #[test]
    fn purchase_outcome_debug_names() {
        assert_eq!(format!("{:?}", PurchaseOutcome::Recorded), "Recorded");
        assert_eq!(
            format!("{:?}", PurchaseOutcome::AlreadyRecorded),
            "AlreadyRecorded"
        );
        assert_eq!(format!("{:?}", PurchaseOutcome::NotFound), "NotFound");
    }

    #[tokio::test]
    async fn mark_complete_is_a_set_insert() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = get_test_pool().await?;
        let user_id: Uuid =
            sqlx::query_scalar("INSERT INTO users (email) VALUES ('ada@example.com') RETURNING id")
                .fetch_one(&pool)
                .await?;
        let course_id: i64 =
            sqlx::query_scalar("INSERT INTO courses (title) VALUES ('Rust') RETURNING id")
                .fetch_one(&pool)
                .await?;
        let lesson_id: i64 = sqlx::query_scalar(
            "INSERT INTO lessons (course_id, title, display_order, is_free) VALUES ($1, 'Intro', 1, TRUE) RETURNING id",
        )
        .bind(course_id)
        .fetch_one(&pool)
        .await?;

        let store = PgProgressStore::new(pool.clone());
        assert!(store.mark_complete(user_id, lesson_id).await?);
        assert!(!store.mark_complete(user_id, lesson_id).await?);

        // Concurrent views of the same lesson still leave one row.
        let other: Uuid =
            sqlx::query_scalar("INSERT INTO users (email) VALUES ('bob@example.com') RETURNING id")
                .fetch_one(&pool)
                .await?;
        let (first, second) = tokio::join!(
            store.mark_complete(other, lesson_id),
            store.mark_complete(other, lesson_id)
        );
        assert_eq!(u8::from(first?) + u8::from(second?), 1);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lesson_completions")
            .fetch_one(&pool)
            .await?;
        assert_eq!(rows, 2);

        let learner = load_learner(&pool, user_id).await?;
        assert!(learner.has_completed(lesson_id));
        Ok(())
    }
}
