use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{
    Course, CourseRequest, EnrolledSubject, EnrollmentRequest, Feedback, FeedbackUpdate, Grade,
    GradeUpdate, NewCourseRequest, NewEnrollmentRequest, NewFeedback, NewGrade, RequestStatus,
};
use crate::api::SchoolApi;
use crate::config::SyncConfig;

pub struct HttpSchoolApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct AssignFeedbackBody {
    assignee_id: i64,
}

impl HttpSchoolApi {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout_ms: u64,
    ) -> Result<Self, ApiError> {
        if base_url.trim().is_empty() {
            return Err(ApiError::Config("api base url cannot be empty".to_string()));
        }
        if timeout_ms == 0 {
            return Err(ApiError::Config(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .map_err(|error| ApiError::Config(error.to_string()))?,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.api_base_url,
            config.api_token.clone(),
            config.request_timeout_ms,
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.send_raw(method, path, body).await?;
        serde_json::from_str(&text).map_err(|error| {
            ApiError::InvalidResponse(format!("failed to parse response from {path}: {error}"))
        })
    }

    async fn send_raw<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<String, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        tracing::debug!(%method, %url, "school api request");

        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::from_response_body(status.as_u16(), &text));
        }
        Ok(text)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_raw::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    fn review_path(collection: &str, id: i64, status: RequestStatus) -> Result<String, ApiError> {
        let action = status.action().ok_or_else(|| {
            ApiError::InvalidTransition(format!("cannot move a request back to {status}"))
        })?;
        Ok(format!("{collection}/{id}/{action}"))
    }
}

#[async_trait]
impl SchoolApi for HttpSchoolApi {
    async fn list_enrollment_requests(&self) -> Result<Vec<EnrollmentRequest>, ApiError> {
        self.get("enrollment-requests").await
    }

    async fn create_enrollment_request(
        &self,
        request: NewEnrollmentRequest,
    ) -> Result<EnrollmentRequest, ApiError> {
        self.send(Method::POST, "enrollment-requests", Some(&request))
            .await
    }

    async fn set_enrollment_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<EnrollmentRequest, ApiError> {
        let path = Self::review_path("enrollment-requests", id, status)?;
        self.send::<(), _>(Method::POST, &path, None).await
    }

    async fn list_enrolled_subjects(
        &self,
        student_id: i64,
    ) -> Result<Vec<EnrolledSubject>, ApiError> {
        self.get(&format!("students/{student_id}/subjects")).await
    }

    async fn list_course_requests(&self) -> Result<Vec<CourseRequest>, ApiError> {
        self.get("course-requests").await
    }

    async fn create_course_request(
        &self,
        request: NewCourseRequest,
    ) -> Result<CourseRequest, ApiError> {
        self.send(Method::POST, "course-requests", Some(&request)).await
    }

    async fn set_course_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<CourseRequest, ApiError> {
        let path = Self::review_path("course-requests", id, status)?;
        self.send::<(), _>(Method::POST, &path, None).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
        self.get("courses").await
    }

    async fn list_grades(&self) -> Result<Vec<Grade>, ApiError> {
        self.get("grades").await
    }

    async fn create_grade(&self, grade: NewGrade) -> Result<Grade, ApiError> {
        self.send(Method::POST, "grades", Some(&grade)).await
    }

    async fn update_grade(&self, id: i64, update: GradeUpdate) -> Result<Grade, ApiError> {
        self.send(Method::PUT, &format!("grades/{id}"), Some(&update))
            .await
    }

    async fn delete_grade(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("grades/{id}")).await
    }

    async fn list_feedback(&self) -> Result<Vec<Feedback>, ApiError> {
        self.get("feedback").await
    }

    async fn create_feedback(&self, feedback: NewFeedback) -> Result<Feedback, ApiError> {
        self.send(Method::POST, "feedback", Some(&feedback)).await
    }

    async fn update_feedback(
        &self,
        id: i64,
        update: FeedbackUpdate,
    ) -> Result<Feedback, ApiError> {
        self.send(Method::PUT, &format!("feedback/{id}"), Some(&update))
            .await
    }

    async fn assign_feedback(&self, id: i64, assignee_id: i64) -> Result<Feedback, ApiError> {
        self.send(
            Method::POST,
            &format!("feedback/{id}/assign"),
            Some(&AssignFeedbackBody { assignee_id }),
        )
        .await
    }

    async fn delete_feedback(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("feedback/{id}")).await
    }
}
