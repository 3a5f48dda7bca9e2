//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{
    ApiError, Course, CourseRequest, EnrolledSubject, EnrollmentRequest, Feedback,
    FeedbackUpdate, Grade, GradeUpdate, InMemorySchoolApi, NewCourseRequest,
    NewEnrollmentRequest, NewFeedback, NewGrade, RequestStatus, SchoolApi,
};
use crate::bus::EventBus;
use crate::refresh::RefreshConfig;
use crate::store::StoreContext;

/// In-memory backend whose reads and writes can be switched to fail.
#[derive(Default)]
pub struct FlakyApi {
    pub inner: InMemorySchoolApi,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyApi {
    pub fn new(inner: InMemorySchoolApi) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> Result<(), ApiError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ApiError::Request("connection refused".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> Result<(), ApiError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SchoolApi for FlakyApi {
    async fn list_enrollment_requests(&self) -> Result<Vec<EnrollmentRequest>, ApiError> {
        self.read()?;
        self.inner.list_enrollment_requests().await
    }

    async fn create_enrollment_request(
        &self,
        request: NewEnrollmentRequest,
    ) -> Result<EnrollmentRequest, ApiError> {
        self.write()?;
        self.inner.create_enrollment_request(request).await
    }

    async fn set_enrollment_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<EnrollmentRequest, ApiError> {
        self.write()?;
        self.inner.set_enrollment_request_status(id, status).await
    }

    async fn list_enrolled_subjects(
        &self,
        student_id: i64,
    ) -> Result<Vec<EnrolledSubject>, ApiError> {
        self.read()?;
        self.inner.list_enrolled_subjects(student_id).await
    }

    async fn list_course_requests(&self) -> Result<Vec<CourseRequest>, ApiError> {
        self.read()?;
        self.inner.list_course_requests().await
    }

    async fn create_course_request(
        &self,
        request: NewCourseRequest,
    ) -> Result<CourseRequest, ApiError> {
        self.write()?;
        self.inner.create_course_request(request).await
    }

    async fn set_course_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<CourseRequest, ApiError> {
        self.write()?;
        self.inner.set_course_request_status(id, status).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
        self.read()?;
        self.inner.list_courses().await
    }

    async fn list_grades(&self) -> Result<Vec<Grade>, ApiError> {
        self.read()?;
        self.inner.list_grades().await
    }

    async fn create_grade(&self, grade: NewGrade) -> Result<Grade, ApiError> {
        self.write()?;
        self.inner.create_grade(grade).await
    }

    async fn update_grade(&self, id: i64, update: GradeUpdate) -> Result<Grade, ApiError> {
        self.write()?;
        self.inner.update_grade(id, update).await
    }

    async fn delete_grade(&self, id: i64) -> Result<(), ApiError> {
        self.write()?;
        self.inner.delete_grade(id).await
    }

    async fn list_feedback(&self) -> Result<Vec<Feedback>, ApiError> {
        self.read()?;
        self.inner.list_feedback().await
    }

    async fn create_feedback(&self, feedback: NewFeedback) -> Result<Feedback, ApiError> {
        self.write()?;
        self.inner.create_feedback(feedback).await
    }

    async fn update_feedback(
        &self,
        id: i64,
        update: FeedbackUpdate,
    ) -> Result<Feedback, ApiError> {
        self.write()?;
        self.inner.update_feedback(id, update).await
    }

    async fn assign_feedback(&self, id: i64, assignee_id: i64) -> Result<Feedback, ApiError> {
        self.write()?;
        self.inner.assign_feedback(id, assignee_id).await
    }

    async fn delete_feedback(&self, id: i64) -> Result<(), ApiError> {
        self.write()?;
        self.inner.delete_feedback(id).await
    }
}

/// Demo data behind a [`FlakyApi`], on a private bus, with auto-refresh off
/// so only events and explicit refetches load data.
pub fn demo_context() -> (Arc<FlakyApi>, StoreContext) {
    let api = Arc::new(FlakyApi::new(InMemorySchoolApi::with_demo_data()));
    let ctx = StoreContext::new(
        api.clone(),
        EventBus::new(),
        RefreshConfig::new(Duration::from_secs(60), false),
    );
    (api, ctx)
}

/// Poll `condition` until it holds, failing the test after about two seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
