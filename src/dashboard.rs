//! One session's worth of mounted stores.
//!
//! A browser session renders several dashboards at once; each panel owns a
//! store instance. `Dashboard` mounts the same set headlessly so that an
//! enrollment approval made through one store is observed by the others
//! through the bus alone.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::api::{ApiError, SchoolApi};
use crate::bus::EventBus;
use crate::config::SyncConfig;
use crate::refresh::RefreshError;
use crate::store::{
    CourseRequestsStore, CoursesGradesStore, EnrolledSubjectsStore, EnrollmentRequestsStore,
    FeedbackStore, StoreContext,
};

pub struct Dashboard {
    pub enrollment_requests: EnrollmentRequestsStore,
    /// Only mounted when the session follows a student.
    pub enrolled_subjects: Option<EnrolledSubjectsStore>,
    pub course_requests: CourseRequestsStore,
    pub courses_grades: CoursesGradesStore,
    pub feedback: FeedbackStore,
}

/// Counts shown in the dashboard header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub pending_enrollments: usize,
    pub enrolled_subjects: Option<usize>,
    pub open_course_requests: usize,
    pub courses: usize,
    pub grades: usize,
    pub triage_queue: usize,
    pub errors: Vec<String>,
}

impl Dashboard {
    /// Mount every store concurrently; each performs its initial fetch.
    pub async fn mount(ctx: &StoreContext, student_id: Option<i64>) -> Result<Self, RefreshError> {
        let enrolled = async {
            match student_id {
                Some(student_id) => EnrolledSubjectsStore::mount(ctx, student_id).await.map(Some),
                None => Ok(None),
            }
        };
        let (enrollment_requests, enrolled_subjects, course_requests, courses_grades, feedback) = tokio::try_join!(
            EnrollmentRequestsStore::mount(ctx),
            enrolled,
            CourseRequestsStore::mount(ctx),
            CoursesGradesStore::mount(ctx),
            FeedbackStore::mount(ctx),
        )?;

        tracing::info!(
            student = ?student_id,
            stores = if enrolled_subjects.is_some() { 5 } else { 4 },
            "dashboard mounted"
        );
        Ok(Self {
            enrollment_requests,
            enrolled_subjects,
            course_requests,
            courses_grades,
            feedback,
        })
    }

    /// Mount against `api` with the refresh settings and student from
    /// `config`.
    pub async fn from_config(
        config: &SyncConfig,
        api: Arc<dyn SchoolApi>,
        bus: EventBus,
    ) -> Result<Self, RefreshError> {
        let ctx = StoreContext::new(api, bus, config.refresh);
        Self::mount(&ctx, config.student_id).await
    }

    pub fn summary(&self) -> DashboardSummary {
        let mut errors = Vec::new();
        let mut note = |name: &str, error: Option<String>| {
            if let Some(error) = error {
                errors.push(format!("{name}: {error}"));
            }
        };
        note(self.enrollment_requests.name(), self.enrollment_requests.error());
        note(self.course_requests.name(), self.course_requests.error());
        note(self.courses_grades.name(), self.courses_grades.error());
        note(self.feedback.name(), self.feedback.error());
        if let Some(subjects) = &self.enrolled_subjects {
            note(subjects.name(), subjects.error());
        }

        let open_course_requests = self.course_requests.with_data(|requests| {
            requests
                .iter()
                .filter(|request| request.status.is_open())
                .count()
        });
        let (courses, grades) = self
            .courses_grades
            .with_data(|data| (data.courses.len(), data.grades.len()));

        DashboardSummary {
            pending_enrollments: self.enrollment_requests.pending().len(),
            enrolled_subjects: self
                .enrolled_subjects
                .as_ref()
                .map(|subjects| subjects.with_data(Vec::len)),
            open_course_requests,
            courses,
            grades,
            triage_queue: self.feedback.triage_queue().len(),
            errors,
        }
    }

    /// Whether any store still has a fetch in flight.
    pub fn is_loading(&self) -> bool {
        self.enrollment_requests.is_loading()
            || self.course_requests.is_loading()
            || self.courses_grades.is_loading()
            || self.feedback.is_loading()
            || self
                .enrolled_subjects
                .as_ref()
                .is_some_and(|subjects| subjects.is_loading())
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.enrollment_requests.set_auto_refresh(enabled);
        self.course_requests.set_auto_refresh(enabled);
        self.courses_grades.set_auto_refresh(enabled);
        self.feedback.set_auto_refresh(enabled);
        if let Some(subjects) = &self.enrolled_subjects {
            subjects.set_auto_refresh(enabled);
        }
    }

    pub fn set_refresh_interval(&self, interval: Duration) -> Result<(), RefreshError> {
        self.enrollment_requests.set_refresh_interval(interval)?;
        self.course_requests.set_refresh_interval(interval)?;
        self.courses_grades.set_refresh_interval(interval)?;
        self.feedback.set_refresh_interval(interval)?;
        if let Some(subjects) = &self.enrolled_subjects {
            subjects.set_refresh_interval(interval)?;
        }
        Ok(())
    }

    /// Approve the oldest open enrollment request, if any.
    pub async fn approve_next_enrollment(&self) -> Result<Option<i64>, ApiError> {
        let Some(next) = self.enrollment_requests.pending().into_iter().next() else {
            return Ok(None);
        };
        self.enrollment_requests.approve(next.id).await?;
        Ok(Some(next.id))
    }

    /// Unmount every store.
    pub fn unmount(self) {
        tracing::info!("dashboard unmounted");
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{demo_context, wait_until};

    #[tokio::test]
    async fn test_mounts_every_store_with_initial_data() {
        let (_api, ctx) = demo_context();
        let dashboard = Dashboard::mount(&ctx, Some(1000)).await.unwrap();

        assert_eq!(
            dashboard.summary(),
            DashboardSummary {
                pending_enrollments: 2,
                enrolled_subjects: Some(0),
                open_course_requests: 1,
                courses: 1,
                grades: 2,
                triage_queue: 1,
                errors: Vec::new(),
            }
        );
        assert!(!dashboard.is_loading());
    }

    #[tokio::test]
    async fn test_skips_enrolled_subjects_without_a_student() {
        let (_api, ctx) = demo_context();
        let dashboard = Dashboard::mount(&ctx, None).await.unwrap();
        assert!(dashboard.enrolled_subjects.is_none());
        assert_eq!(dashboard.summary().enrolled_subjects, None);
    }

    #[tokio::test]
    async fn test_approval_reaches_the_student_panel() {
        let (_api, ctx) = demo_context();
        let dashboard = Dashboard::mount(&ctx, Some(1000)).await.unwrap();

        let approved = dashboard.approve_next_enrollment().await.unwrap();
        assert!(approved.is_some());
        let subjects = dashboard.enrolled_subjects.as_ref().unwrap();
        wait_until("student panel to refetch", || subjects.is_enrolled(1)).await;
        assert_eq!(dashboard.summary().pending_enrollments, 1);
    }

    #[tokio::test]
    async fn test_fetch_errors_surface_in_summary() {
        let (api, ctx) = demo_context();
        api.fail_reads(true);
        let dashboard = Dashboard::mount(&ctx, None).await.unwrap();

        let summary = dashboard.summary();
        assert_eq!(summary.errors.len(), 4);
        assert!(summary.errors[0].starts_with("enrollment_requests: "));
    }

    #[tokio::test]
    async fn test_unmount_releases_every_listener() {
        let (_api, ctx) = demo_context();
        let dashboard = Dashboard::mount(&ctx, Some(1000)).await.unwrap();
        dashboard.unmount();
        for kind in crate::bus::EventKind::all() {
            assert_eq!(ctx.bus.listener_count(*kind), 0, "{kind}");
        }
    }
}
