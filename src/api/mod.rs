//! Remote school management API.
//!
//! The stores only see the [`SchoolApi`] trait. Two implementations ship
//! with the crate:
//! - [`HttpSchoolApi`]: JSON over HTTP against the real backend
//! - [`InMemorySchoolApi`]: an in-process backend for demos and tests

pub mod client;
pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use client::HttpSchoolApi;
pub use error::ApiError;
pub use memory::InMemorySchoolApi;
pub use types::{
    Course, CourseRequest, EnrolledSubject, EnrollmentRequest, Feedback, FeedbackKind,
    FeedbackStatus, FeedbackUpdate, Grade, GradeUpdate, NewCourseRequest, NewEnrollmentRequest,
    NewFeedback, NewGrade, Priority, RequestStatus,
};

#[cfg(test)]
mod tests;

/// Operations the stores need from the backend. Every call is one round trip.
#[async_trait]
pub trait SchoolApi: Send + Sync {
    async fn list_enrollment_requests(&self) -> Result<Vec<EnrollmentRequest>, ApiError>;
    async fn create_enrollment_request(
        &self,
        request: NewEnrollmentRequest,
    ) -> Result<EnrollmentRequest, ApiError>;
    async fn set_enrollment_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<EnrollmentRequest, ApiError>;

    async fn list_enrolled_subjects(&self, student_id: i64)
        -> Result<Vec<EnrolledSubject>, ApiError>;

    async fn list_course_requests(&self) -> Result<Vec<CourseRequest>, ApiError>;
    async fn create_course_request(
        &self,
        request: NewCourseRequest,
    ) -> Result<CourseRequest, ApiError>;
    async fn set_course_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<CourseRequest, ApiError>;

    async fn list_courses(&self) -> Result<Vec<Course>, ApiError>;
    async fn list_grades(&self) -> Result<Vec<Grade>, ApiError>;
    async fn create_grade(&self, grade: NewGrade) -> Result<Grade, ApiError>;
    async fn update_grade(&self, id: i64, update: GradeUpdate) -> Result<Grade, ApiError>;
    async fn delete_grade(&self, id: i64) -> Result<(), ApiError>;

    async fn list_feedback(&self) -> Result<Vec<Feedback>, ApiError>;
    async fn create_feedback(&self, feedback: NewFeedback) -> Result<Feedback, ApiError>;
    async fn update_feedback(&self, id: i64, update: FeedbackUpdate)
        -> Result<Feedback, ApiError>;
    async fn assign_feedback(&self, id: i64, assignee_id: i64) -> Result<Feedback, ApiError>;
    async fn delete_feedback(&self, id: i64) -> Result<(), ApiError>;
}
