use std::ops::Deref;

use async_trait::async_trait;

use crate::api::{
    ApiError, Feedback, FeedbackStatus, FeedbackUpdate, NewFeedback, SchoolApi,
};
use crate::bus::{AppEvent, Assignment, EventKind, RecordRef};
use crate::refresh::RefreshError;
use crate::store::slice::{remove_by_key, upsert, LiveSlice, SliceSource, StoreContext};

/// Feedback and alerts raised by students, parents and staff.
pub struct FeedbackSource;

#[async_trait]
impl SliceSource for FeedbackSource {
    type Data = Vec<Feedback>;

    const NAME: &'static str = "feedback";

    fn stale_on(&self) -> &'static [EventKind] {
        &[
            EventKind::FeedbackCreated,
            EventKind::FeedbackUpdated,
            EventKind::FeedbackAssigned,
            EventKind::FeedbackDeleted,
        ]
    }

    async fn load(&self, api: &dyn SchoolApi) -> Result<Self::Data, ApiError> {
        api.list_feedback().await
    }
}

pub struct FeedbackStore {
    slice: LiveSlice<FeedbackSource>,
}

impl FeedbackStore {
    pub async fn mount(ctx: &StoreContext) -> Result<Self, RefreshError> {
        Ok(Self {
            slice: LiveSlice::mount(FeedbackSource, ctx).await?,
        })
    }

    /// Open, unassigned items: most urgent first, then oldest.
    pub fn triage_queue(&self) -> Vec<Feedback> {
        self.slice.with_data(|items| {
            let mut queue: Vec<Feedback> = items
                .iter()
                .filter(|item| item.status == FeedbackStatus::Open && item.assignee_id.is_none())
                .cloned()
                .collect();
            queue.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            });
            queue
        })
    }

    pub fn assigned_to(&self, assignee_id: i64) -> Vec<Feedback> {
        self.slice.with_data(|items| {
            items
                .iter()
                .filter(|item| item.assignee_id == Some(assignee_id))
                .cloned()
                .collect()
        })
    }

    pub async fn create(&self, feedback: NewFeedback) -> Result<Feedback, ApiError> {
        let created = self.slice.api().create_feedback(feedback).await?;
        self.slice.patch(|items| upsert(items, created.clone()));
        self.slice.emit(AppEvent::FeedbackCreated(created.clone()));
        Ok(created)
    }

    pub async fn update(&self, id: i64, update: FeedbackUpdate) -> Result<Feedback, ApiError> {
        let updated = self.slice.api().update_feedback(id, update).await?;
        self.slice.patch(|items| upsert(items, updated.clone()));
        self.slice.emit(AppEvent::FeedbackUpdated(updated.clone()));
        Ok(updated)
    }

    pub async fn assign(&self, id: i64, assignee_id: i64) -> Result<Feedback, ApiError> {
        let assigned = self.slice.api().assign_feedback(id, assignee_id).await?;
        self.slice.patch(|items| upsert(items, assigned.clone()));
        self.slice
            .emit(AppEvent::FeedbackAssigned(Assignment { id, assignee_id }));
        Ok(assigned)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.slice.api().delete_feedback(id).await?;
        self.slice.patch(|items| remove_by_key(items, id));
        self.slice.emit(AppEvent::FeedbackDeleted(RecordRef { id }));
        Ok(())
    }

    pub fn unmount(self) {
        self.slice.unmount();
    }
}

impl Deref for FeedbackStore {
    type Target = LiveSlice<FeedbackSource>;

    fn deref(&self) -> &Self::Target {
        &self.slice
    }
}
