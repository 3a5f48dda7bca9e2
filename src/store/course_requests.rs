use std::ops::Deref;

use async_trait::async_trait;

use crate::api::{ApiError, CourseRequest, NewCourseRequest, RequestStatus, SchoolApi};
use crate::bus::{AppEvent, EventKind, RecordRef};
use crate::refresh::RefreshError;
use crate::store::slice::{upsert, LiveSlice, SliceSource, StoreContext};

/// Teachers' requests to open a course, reviewed by admins.
pub struct CourseRequestsSource;

#[async_trait]
impl SliceSource for CourseRequestsSource {
    type Data = Vec<CourseRequest>;

    const NAME: &'static str = "course_requests";

    fn stale_on(&self) -> &'static [EventKind] {
        &[
            EventKind::CourseRequestCreated,
            EventKind::CourseRequestApproved,
            EventKind::CourseRequestDeclined,
            EventKind::CourseRequestUnderReview,
        ]
    }

    async fn load(&self, api: &dyn SchoolApi) -> Result<Self::Data, ApiError> {
        api.list_course_requests().await
    }
}

pub struct CourseRequestsStore {
    slice: LiveSlice<CourseRequestsSource>,
}

impl CourseRequestsStore {
    pub async fn mount(ctx: &StoreContext) -> Result<Self, RefreshError> {
        Ok(Self {
            slice: LiveSlice::mount(CourseRequestsSource, ctx).await?,
        })
    }

    pub fn for_teacher(&self, teacher_id: i64) -> Vec<CourseRequest> {
        self.slice.with_data(|requests| {
            requests
                .iter()
                .filter(|request| request.teacher_id == teacher_id)
                .cloned()
                .collect()
        })
    }

    pub async fn create(&self, request: NewCourseRequest) -> Result<CourseRequest, ApiError> {
        let created = self.slice.api().create_course_request(request).await?;
        self.slice.patch(|requests| upsert(requests, created.clone()));
        self.slice
            .emit(AppEvent::CourseRequestCreated(created.clone()));
        Ok(created)
    }

    pub async fn approve(&self, id: i64) -> Result<CourseRequest, ApiError> {
        self.review(id, RequestStatus::Approved).await
    }

    pub async fn decline(&self, id: i64) -> Result<CourseRequest, ApiError> {
        self.review(id, RequestStatus::Declined).await
    }

    pub async fn mark_under_review(&self, id: i64) -> Result<CourseRequest, ApiError> {
        self.review(id, RequestStatus::UnderReview).await
    }

    async fn review(&self, id: i64, status: RequestStatus) -> Result<CourseRequest, ApiError> {
        let record = RecordRef { id };
        let event = match status {
            RequestStatus::Approved => AppEvent::CourseRequestApproved(record),
            RequestStatus::Declined => AppEvent::CourseRequestDeclined(record),
            RequestStatus::UnderReview => AppEvent::CourseRequestUnderReview(record),
            RequestStatus::Pending => {
                return Err(ApiError::InvalidTransition(
                    "course requests cannot be moved back to pending".to_string(),
                ))
            }
        };

        let updated = self.slice.api().set_course_request_status(id, status).await?;
        self.slice.patch(|requests| upsert(requests, updated.clone()));
        self.slice.emit(event);
        Ok(updated)
    }

    pub fn unmount(self) {
        self.slice.unmount();
    }
}

impl Deref for CourseRequestsStore {
    type Target = LiveSlice<CourseRequestsSource>;

    fn deref(&self) -> &Self::Target {
        &self.slice
    }
}
