//! Enrollment requests as seen by the admin review queue and the student
//! "my requests" panel.

use std::ops::Deref;

use async_trait::async_trait;

use crate::api::{ApiError, EnrollmentRequest, NewEnrollmentRequest, RequestStatus, SchoolApi};
use crate::bus::{AppEvent, EventKind, RecordRef};
use crate::refresh::RefreshError;
use crate::store::slice::{upsert, LiveSlice, SliceSource, StoreContext};

pub struct EnrollmentRequestsSource;

#[async_trait]
impl SliceSource for EnrollmentRequestsSource {
    type Data = Vec<EnrollmentRequest>;

    const NAME: &'static str = "enrollment_requests";

    fn stale_on(&self) -> &'static [EventKind] {
        &[
            EventKind::EnrollmentRequestCreated,
            EventKind::EnrollmentRequestApproved,
            EventKind::EnrollmentRequestDeclined,
            EventKind::EnrollmentRequestUnderReview,
        ]
    }

    async fn load(&self, api: &dyn SchoolApi) -> Result<Self::Data, ApiError> {
        api.list_enrollment_requests().await
    }
}

pub struct EnrollmentRequestsStore {
    slice: LiveSlice<EnrollmentRequestsSource>,
}

impl EnrollmentRequestsStore {
    pub async fn mount(ctx: &StoreContext) -> Result<Self, RefreshError> {
        Ok(Self {
            slice: LiveSlice::mount(EnrollmentRequestsSource, ctx).await?,
        })
    }

    /// Requests a reviewer can still act on, oldest first.
    pub fn pending(&self) -> Vec<EnrollmentRequest> {
        self.slice.with_data(|requests| {
            let mut open: Vec<EnrollmentRequest> = requests
                .iter()
                .filter(|request| request.status.is_open())
                .cloned()
                .collect();
            open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            open
        })
    }

    pub async fn create(&self, request: NewEnrollmentRequest) -> Result<EnrollmentRequest, ApiError> {
        let created = self.slice.api().create_enrollment_request(request).await?;
        self.slice.patch(|requests| upsert(requests, created.clone()));
        self.slice
            .emit(AppEvent::EnrollmentRequestCreated(created.clone()));
        Ok(created)
    }

    pub async fn approve(&self, id: i64) -> Result<EnrollmentRequest, ApiError> {
        self.review(id, RequestStatus::Approved).await
    }

    pub async fn decline(&self, id: i64) -> Result<EnrollmentRequest, ApiError> {
        self.review(id, RequestStatus::Declined).await
    }

    pub async fn mark_under_review(&self, id: i64) -> Result<EnrollmentRequest, ApiError> {
        self.review(id, RequestStatus::UnderReview).await
    }

    async fn review(&self, id: i64, status: RequestStatus) -> Result<EnrollmentRequest, ApiError> {
        let record = RecordRef { id };
        let event = match status {
            RequestStatus::Approved => AppEvent::EnrollmentRequestApproved(record),
            RequestStatus::Declined => AppEvent::EnrollmentRequestDeclined(record),
            RequestStatus::UnderReview => AppEvent::EnrollmentRequestUnderReview(record),
            RequestStatus::Pending => {
                return Err(ApiError::InvalidTransition(
                    "enrollment requests cannot be moved back to pending".to_string(),
                ))
            }
        };

        let updated = self
            .slice
            .api()
            .set_enrollment_request_status(id, status)
            .await?;
        self.slice.patch(|requests| upsert(requests, updated.clone()));
        self.slice.emit(event);
        Ok(updated)
    }

    pub fn unmount(self) {
        self.slice.unmount();
    }
}

impl Deref for EnrollmentRequestsStore {
    type Target = LiveSlice<EnrollmentRequestsSource>;

    fn deref(&self) -> &Self::Target {
        &self.slice
    }
}
