use tracing::warn;

use super::ApiClient;
use crate::api::handlers::courses::types::{CourseLessonsResponse, CourseResponse, LessonSummary};

impl ApiClient {
    /// Courses visible to the caller. Failures render as an empty catalog.
    pub async fn courses(&self) -> Vec<CourseResponse> {
        match self.fetch::<Vec<CourseResponse>>("v1/courses").await {
            Ok(courses) => courses,
            Err(err) => {
                warn!("Failed to load courses: {err:#}");
                Vec::new()
            }
        }
    }

    /// Canonically ordered lessons with the caller's lock state.
    /// Failures render as an empty list.
    pub async fn course_lessons(&self, course_id: i64) -> Vec<LessonSummary> {
        let path = format!("v1/courses/{course_id}/lessons");
        match self.fetch::<CourseLessonsResponse>(&path).await {
            Ok(response) => response.lessons,
            Err(err) => {
                warn!(course_id, "Failed to load lessons: {err:#}");
                Vec::new()
            }
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let request = self.http.get(self.endpoint(path)?);
        let response = self.authorized(request).await.send().await?;
        Ok(response.error_for_status()?.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn lesson_fetch_failure_renders_empty_list() -> Result<()> {
        let client = ApiClient::new("http://127.0.0.1:9")?;
        assert!(client.course_lessons(1).await.is_empty());
        assert!(client.courses().await.is_empty());
        Ok(())
    }
}
