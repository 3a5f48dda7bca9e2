//! In-process implementation of the school API.
//!
//! Mirrors the server-side rules the stores depend on: approving an
//! enrollment request enrolls the student, approving a course request
//! opens the course, and review actions only apply to open requests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{
    Course, CourseRequest, EnrolledSubject, EnrollmentRequest, Feedback, FeedbackKind,
    FeedbackStatus, FeedbackUpdate, Grade, GradeUpdate, NewCourseRequest, NewEnrollmentRequest,
    NewFeedback, NewGrade, Priority, RequestStatus,
};
use crate::api::SchoolApi;

#[derive(Default)]
struct Tables {
    next_id: i64,
    subjects: BTreeMap<i64, String>,
    enrollment_requests: BTreeMap<i64, EnrollmentRequest>,
    enrolled: Vec<EnrolledSubject>,
    course_requests: BTreeMap<i64, CourseRequest>,
    courses: BTreeMap<i64, Course>,
    grades: BTreeMap<i64, Grade>,
    feedback: BTreeMap<i64, Feedback>,
    teachers: HashMap<i64, String>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct InMemorySchoolApi {
    tables: Mutex<Tables>,
    latency: Duration,
}

impl Default for InMemorySchoolApi {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn conflict(message: String) -> ApiError {
    ApiError::Status {
        status: 409,
        message,
    }
}

fn unprocessable(message: String) -> ApiError {
    ApiError::Status {
        status: 422,
        message,
    }
}

impl InMemorySchoolApi {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency` to mimic a network round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a subject students can request enrollment in.
    pub fn add_subject(&self, id: i64, name: &str) {
        let mut tables = self.lock();
        tables.subjects.insert(id, name.to_string());
        tables.next_id = tables.next_id.max(id);
    }

    pub fn add_teacher(&self, id: i64, name: &str) {
        self.lock().teachers.insert(id, name.to_string());
    }

    pub fn add_course(&self, id: i64, name: &str, teacher_id: i64) {
        let mut tables = self.lock();
        tables.courses.insert(
            id,
            Course {
                id,
                name: name.to_string(),
                teacher_id,
            },
        );
        tables.next_id = tables.next_id.max(id);
    }

    /// A small school: three subjects, two teachers, one course with grades,
    /// a couple of pending requests and an open alert.
    pub fn with_demo_data() -> Self {
        let api = Self::new();
        api.add_subject(1, "Mathematics");
        api.add_subject(2, "Physics");
        api.add_subject(3, "Literature");
        api.add_teacher(100, "Ms. Okafor");
        api.add_teacher(101, "Mr. Lindqvist");
        api.add_course(10, "Algebra I", 100);

        {
            let mut tables = api.lock();
            let created_at = now();
            for (student_id, subject_id) in [(1000, 1), (1001, 2)] {
                let id = tables.allocate_id();
                let subject_name = tables.subjects[&subject_id].clone();
                tables.enrollment_requests.insert(
                    id,
                    EnrollmentRequest {
                        id,
                        student_id,
                        subject_id,
                        subject_name,
                        status: RequestStatus::Pending,
                        note: None,
                        created_at: created_at.clone(),
                    },
                );
            }

            let id = tables.allocate_id();
            tables.course_requests.insert(
                id,
                CourseRequest {
                    id,
                    teacher_id: 101,
                    course_name: "Mechanics".to_string(),
                    description: Some("Introductory classical mechanics".to_string()),
                    status: RequestStatus::Pending,
                    created_at: created_at.clone(),
                },
            );

            for (student_id, score) in [(1000, 88.5), (1001, 72.0)] {
                let id = tables.allocate_id();
                tables.grades.insert(
                    id,
                    Grade {
                        id,
                        student_id,
                        course_id: 10,
                        score,
                        term: "2026-T1".to_string(),
                        remarks: None,
                        updated_at: created_at.clone(),
                    },
                );
            }

            let id = tables.allocate_id();
            tables.feedback.insert(
                id,
                Feedback {
                    id,
                    author_id: 1000,
                    kind: FeedbackKind::Alert,
                    subject: "Quiz generator timed out".to_string(),
                    message: "Generating the weekly algebra quiz failed twice".to_string(),
                    priority: Priority::High,
                    status: FeedbackStatus::Open,
                    assignee_id: None,
                    created_at,
                },
            );
        }
        api
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("in-memory api mutex poisoned")
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl SchoolApi for InMemorySchoolApi {
    async fn list_enrollment_requests(&self) -> Result<Vec<EnrollmentRequest>, ApiError> {
        self.round_trip().await;
        Ok(self.lock().enrollment_requests.values().cloned().collect())
    }

    async fn create_enrollment_request(
        &self,
        request: NewEnrollmentRequest,
    ) -> Result<EnrollmentRequest, ApiError> {
        self.round_trip().await;
        let mut tables = self.lock();
        let subject_name = tables
            .subjects
            .get(&request.subject_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("subject {}", request.subject_id)))?;

        let duplicate = tables.enrollment_requests.values().any(|existing| {
            existing.student_id == request.student_id
                && existing.subject_id == request.subject_id
                && existing.status.is_open()
        });
        let already_enrolled = tables.enrolled.iter().any(|enrolled| {
            enrolled.student_id == request.student_id && enrolled.subject_id == request.subject_id
        });
        if duplicate || already_enrolled {
            return Err(conflict(format!(
                "student {} already requested or enrolled in {subject_name}",
                request.student_id
            )));
        }

        let id = tables.allocate_id();
        let created = EnrollmentRequest {
            id,
            student_id: request.student_id,
            subject_id: request.subject_id,
            subject_name,
            status: RequestStatus::Pending,
            note: request.note,
            created_at: now(),
        };
        tables.enrollment_requests.insert(id, created.clone());
        Ok(created)
    }

    async fn set_enrollment_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<EnrollmentRequest, ApiError> {
        self.round_trip().await;
        if status.action().is_none() {
            return Err(ApiError::InvalidTransition(format!(
                "cannot move a request back to {status}"
            )));
        }

        let mut tables = self.lock();
        let request = tables
            .enrollment_requests
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("enrollment request {id}")))?;
        if !request.status.is_open() {
            return Err(conflict(format!(
                "enrollment request {id} is already {}",
                request.status
            )));
        }
        request.status = status;
        let updated = request.clone();

        if status == RequestStatus::Approved {
            let teacher_name = tables
                .courses
                .values()
                .find(|course| course.name == updated.subject_name)
                .and_then(|course| tables.teachers.get(&course.teacher_id).cloned());
            tables.enrolled.push(EnrolledSubject {
                subject_id: updated.subject_id,
                student_id: updated.student_id,
                subject_name: updated.subject_name.clone(),
                teacher_name,
                enrolled_at: now(),
            });
        }
        Ok(updated)
    }

    async fn list_enrolled_subjects(
        &self,
        student_id: i64,
    ) -> Result<Vec<EnrolledSubject>, ApiError> {
        self.round_trip().await;
        Ok(self
            .lock()
            .enrolled
            .iter()
            .filter(|enrolled| enrolled.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn list_course_requests(&self) -> Result<Vec<CourseRequest>, ApiError> {
        self.round_trip().await;
        Ok(self.lock().course_requests.values().cloned().collect())
    }

    async fn create_course_request(
        &self,
        request: NewCourseRequest,
    ) -> Result<CourseRequest, ApiError> {
        self.round_trip().await;
        if request.course_name.trim().is_empty() {
            return Err(unprocessable("course name cannot be empty".to_string()));
        }

        let mut tables = self.lock();
        let id = tables.allocate_id();
        let created = CourseRequest {
            id,
            teacher_id: request.teacher_id,
            course_name: request.course_name.trim().to_string(),
            description: request.description,
            status: RequestStatus::Pending,
            created_at: now(),
        };
        tables.course_requests.insert(id, created.clone());
        Ok(created)
    }

    async fn set_course_request_status(
        &self,
        id: i64,
        status: RequestStatus,
    ) -> Result<CourseRequest, ApiError> {
        self.round_trip().await;
        if status.action().is_none() {
            return Err(ApiError::InvalidTransition(format!(
                "cannot move a request back to {status}"
            )));
        }

        let mut tables = self.lock();
        let request = tables
            .course_requests
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("course request {id}")))?;
        if !request.status.is_open() {
            return Err(conflict(format!(
                "course request {id} is already {}",
                request.status
            )));
        }
        request.status = status;
        let updated = request.clone();

        if status == RequestStatus::Approved {
            let course_id = tables.allocate_id();
            tables.courses.insert(
                course_id,
                Course {
                    id: course_id,
                    name: updated.course_name.clone(),
                    teacher_id: updated.teacher_id,
                },
            );
        }
        Ok(updated)
    }

    async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
        self.round_trip().await;
        Ok(self.lock().courses.values().cloned().collect())
    }

    async fn list_grades(&self) -> Result<Vec<Grade>, ApiError> {
        self.round_trip().await;
        Ok(self.lock().grades.values().cloned().collect())
    }

    async fn create_grade(&self, grade: NewGrade) -> Result<Grade, ApiError> {
        self.round_trip().await;
        if !(0.0..=100.0).contains(&grade.score) {
            return Err(unprocessable(format!(
                "score {} must be between 0 and 100",
                grade.score
            )));
        }

        let mut tables = self.lock();
        if !tables.courses.contains_key(&grade.course_id) {
            return Err(ApiError::NotFound(format!("course {}", grade.course_id)));
        }
        let id = tables.allocate_id();
        let created = Grade {
            id,
            student_id: grade.student_id,
            course_id: grade.course_id,
            score: grade.score,
            term: grade.term,
            remarks: grade.remarks,
            updated_at: now(),
        };
        tables.grades.insert(id, created.clone());
        Ok(created)
    }

    async fn update_grade(&self, id: i64, update: GradeUpdate) -> Result<Grade, ApiError> {
        self.round_trip().await;
        if let Some(score) = update.score {
            if !(0.0..=100.0).contains(&score) {
                return Err(unprocessable(format!(
                    "score {score} must be between 0 and 100"
                )));
            }
        }

        let mut tables = self.lock();
        let grade = tables
            .grades
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("grade {id}")))?;
        if let Some(score) = update.score {
            grade.score = score;
        }
        if update.remarks.is_some() {
            grade.remarks = update.remarks;
        }
        grade.updated_at = now();
        Ok(grade.clone())
    }

    async fn delete_grade(&self, id: i64) -> Result<(), ApiError> {
        self.round_trip().await;
        self.lock()
            .grades
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("grade {id}")))
    }

    async fn list_feedback(&self) -> Result<Vec<Feedback>, ApiError> {
        self.round_trip().await;
        Ok(self.lock().feedback.values().cloned().collect())
    }

    async fn create_feedback(&self, feedback: NewFeedback) -> Result<Feedback, ApiError> {
        self.round_trip().await;
        if feedback.subject.trim().is_empty() {
            return Err(unprocessable("feedback subject cannot be empty".to_string()));
        }

        let mut tables = self.lock();
        let id = tables.allocate_id();
        let created = Feedback {
            id,
            author_id: feedback.author_id,
            kind: feedback.kind,
            subject: feedback.subject.trim().to_string(),
            message: feedback.message,
            priority: feedback.priority,
            status: FeedbackStatus::Open,
            assignee_id: None,
            created_at: now(),
        };
        tables.feedback.insert(id, created.clone());
        Ok(created)
    }

    async fn update_feedback(
        &self,
        id: i64,
        update: FeedbackUpdate,
    ) -> Result<Feedback, ApiError> {
        self.round_trip().await;
        let mut tables = self.lock();
        let feedback = tables
            .feedback
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("feedback {id}")))?;
        if let Some(subject) = update.subject {
            feedback.subject = subject;
        }
        if let Some(message) = update.message {
            feedback.message = message;
        }
        if let Some(priority) = update.priority {
            feedback.priority = priority;
        }
        if let Some(status) = update.status {
            feedback.status = status;
        }
        Ok(feedback.clone())
    }

    async fn assign_feedback(&self, id: i64, assignee_id: i64) -> Result<Feedback, ApiError> {
        self.round_trip().await;
        let mut tables = self.lock();
        let feedback = tables
            .feedback
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("feedback {id}")))?;
        if feedback.status == FeedbackStatus::Resolved {
            return Err(conflict(format!("feedback {id} is already resolved")));
        }
        feedback.assignee_id = Some(assignee_id);
        feedback.status = FeedbackStatus::Assigned;
        Ok(feedback.clone())
    }

    async fn delete_feedback(&self, id: i64) -> Result<(), ApiError> {
        self.round_trip().await;
        self.lock()
            .feedback
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("feedback {id}")))
    }
}
