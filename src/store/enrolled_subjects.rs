use std::ops::Deref;

use async_trait::async_trait;

use crate::api::{ApiError, EnrolledSubject, SchoolApi};
use crate::bus::EventKind;
use crate::refresh::RefreshError;
use crate::store::slice::{LiveSlice, SliceSource, StoreContext};

/// Subjects one student is enrolled in. Read-only; it changes when an
/// enrollment request for the student is approved somewhere else.
pub struct EnrolledSubjectsSource {
    pub student_id: i64,
}

#[async_trait]
impl SliceSource for EnrolledSubjectsSource {
    type Data = Vec<EnrolledSubject>;

    const NAME: &'static str = "enrolled_subjects";

    fn stale_on(&self) -> &'static [EventKind] {
        &[EventKind::EnrollmentRequestApproved]
    }

    async fn load(&self, api: &dyn SchoolApi) -> Result<Self::Data, ApiError> {
        let mut subjects = api.list_enrolled_subjects(self.student_id).await?;
        subjects.sort_by(|a, b| a.subject_name.cmp(&b.subject_name));
        Ok(subjects)
    }
}

pub struct EnrolledSubjectsStore {
    student_id: i64,
    slice: LiveSlice<EnrolledSubjectsSource>,
}

impl EnrolledSubjectsStore {
    pub async fn mount(ctx: &StoreContext, student_id: i64) -> Result<Self, RefreshError> {
        Ok(Self {
            student_id,
            slice: LiveSlice::mount(EnrolledSubjectsSource { student_id }, ctx).await?,
        })
    }

    pub fn student_id(&self) -> i64 {
        self.student_id
    }

    pub fn is_enrolled(&self, subject_id: i64) -> bool {
        self.slice
            .with_data(|subjects| subjects.iter().any(|s| s.subject_id == subject_id))
    }

    pub fn unmount(self) {
        self.slice.unmount();
    }
}

impl Deref for EnrolledSubjectsStore {
    type Target = LiveSlice<EnrolledSubjectsSource>;

    fn deref(&self) -> &Self::Target {
        &self.slice
    }
}
