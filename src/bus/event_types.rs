//! Event vocabulary shared by every producer and consumer on the bus.
//!
//! The set is closed: adding an event means adding both an [`EventKind`]
//! and an [`AppEvent`] variant, so stores that subscribe by kind and
//! mutations that emit events are checked against the same list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::types::{CourseRequest, EnrollmentRequest, Feedback, Grade};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    EnrollmentRequestCreated,
    EnrollmentRequestApproved,
    EnrollmentRequestDeclined,
    EnrollmentRequestUnderReview,
    GradeCreated,
    GradeUpdated,
    GradeDeleted,
    CourseRequestCreated,
    CourseRequestApproved,
    CourseRequestDeclined,
    CourseRequestUnderReview,
    FeedbackCreated,
    FeedbackUpdated,
    FeedbackAssigned,
    FeedbackDeleted,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::EnrollmentRequestCreated => "ENROLLMENT_REQUEST_CREATED",
            EventKind::EnrollmentRequestApproved => "ENROLLMENT_REQUEST_APPROVED",
            EventKind::EnrollmentRequestDeclined => "ENROLLMENT_REQUEST_DECLINED",
            EventKind::EnrollmentRequestUnderReview => "ENROLLMENT_REQUEST_UNDER_REVIEW",
            EventKind::GradeCreated => "GRADE_CREATED",
            EventKind::GradeUpdated => "GRADE_UPDATED",
            EventKind::GradeDeleted => "GRADE_DELETED",
            EventKind::CourseRequestCreated => "COURSE_REQUEST_CREATED",
            EventKind::CourseRequestApproved => "COURSE_REQUEST_APPROVED",
            EventKind::CourseRequestDeclined => "COURSE_REQUEST_DECLINED",
            EventKind::CourseRequestUnderReview => "COURSE_REQUEST_UNDER_REVIEW",
            EventKind::FeedbackCreated => "FEEDBACK_CREATED",
            EventKind::FeedbackUpdated => "FEEDBACK_UPDATED",
            EventKind::FeedbackAssigned => "FEEDBACK_ASSIGNED",
            EventKind::FeedbackDeleted => "FEEDBACK_DELETED",
        }
    }

    pub const fn all() -> &'static [EventKind] {
        &[
            EventKind::EnrollmentRequestCreated,
            EventKind::EnrollmentRequestApproved,
            EventKind::EnrollmentRequestDeclined,
            EventKind::EnrollmentRequestUnderReview,
            EventKind::GradeCreated,
            EventKind::GradeUpdated,
            EventKind::GradeDeleted,
            EventKind::CourseRequestCreated,
            EventKind::CourseRequestApproved,
            EventKind::CourseRequestDeclined,
            EventKind::CourseRequestUnderReview,
            EventKind::FeedbackCreated,
            EventKind::FeedbackUpdated,
            EventKind::FeedbackAssigned,
            EventKind::FeedbackDeleted,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EventKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EventKind::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub assignee_id: i64,
}

/// A state change confirmed by the server, with its typed payload.
///
/// Creates and updates carry the record the server returned; status
/// transitions and deletes carry only the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppEvent {
    EnrollmentRequestCreated(EnrollmentRequest),
    EnrollmentRequestApproved(RecordRef),
    EnrollmentRequestDeclined(RecordRef),
    EnrollmentRequestUnderReview(RecordRef),
    GradeCreated(Grade),
    GradeUpdated(Grade),
    GradeDeleted(RecordRef),
    CourseRequestCreated(CourseRequest),
    CourseRequestApproved(RecordRef),
    CourseRequestDeclined(RecordRef),
    CourseRequestUnderReview(RecordRef),
    FeedbackCreated(Feedback),
    FeedbackUpdated(Feedback),
    FeedbackAssigned(Assignment),
    FeedbackDeleted(RecordRef),
}

impl AppEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AppEvent::EnrollmentRequestCreated(_) => EventKind::EnrollmentRequestCreated,
            AppEvent::EnrollmentRequestApproved(_) => EventKind::EnrollmentRequestApproved,
            AppEvent::EnrollmentRequestDeclined(_) => EventKind::EnrollmentRequestDeclined,
            AppEvent::EnrollmentRequestUnderReview(_) => EventKind::EnrollmentRequestUnderReview,
            AppEvent::GradeCreated(_) => EventKind::GradeCreated,
            AppEvent::GradeUpdated(_) => EventKind::GradeUpdated,
            AppEvent::GradeDeleted(_) => EventKind::GradeDeleted,
            AppEvent::CourseRequestCreated(_) => EventKind::CourseRequestCreated,
            AppEvent::CourseRequestApproved(_) => EventKind::CourseRequestApproved,
            AppEvent::CourseRequestDeclined(_) => EventKind::CourseRequestDeclined,
            AppEvent::CourseRequestUnderReview(_) => EventKind::CourseRequestUnderReview,
            AppEvent::FeedbackCreated(_) => EventKind::FeedbackCreated,
            AppEvent::FeedbackUpdated(_) => EventKind::FeedbackUpdated,
            AppEvent::FeedbackAssigned(_) => EventKind::FeedbackAssigned,
            AppEvent::FeedbackDeleted(_) => EventKind::FeedbackDeleted,
        }
    }

    /// Id of the record the event is about.
    pub fn record_id(&self) -> i64 {
        match self {
            AppEvent::EnrollmentRequestCreated(request) => request.id,
            AppEvent::CourseRequestCreated(request) => request.id,
            AppEvent::GradeCreated(grade) | AppEvent::GradeUpdated(grade) => grade.id,
            AppEvent::FeedbackCreated(feedback) | AppEvent::FeedbackUpdated(feedback) => {
                feedback.id
            }
            AppEvent::FeedbackAssigned(assignment) => assignment.id,
            AppEvent::EnrollmentRequestApproved(record)
            | AppEvent::EnrollmentRequestDeclined(record)
            | AppEvent::EnrollmentRequestUnderReview(record)
            | AppEvent::GradeDeleted(record)
            | AppEvent::CourseRequestApproved(record)
            | AppEvent::CourseRequestDeclined(record)
            | AppEvent::CourseRequestUnderReview(record)
            | AppEvent::FeedbackDeleted(record) => record.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names_round_trip() {
        for kind in EventKind::all() {
            assert_eq!(EventKind::from_str(kind.as_str()).unwrap(), *kind);
        }
        assert_eq!(
            EventKind::from_str("grade_updated").unwrap(),
            EventKind::GradeUpdated
        );
        assert!(EventKind::from_str("GRADE_ARCHIVED").is_err());
        assert_eq!(EventKind::all().len(), 15);
    }

    #[test]
    fn test_app_event_wire_shape_uses_event_name() {
        let event = AppEvent::EnrollmentRequestApproved(RecordRef { id: 42 });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "ENROLLMENT_REQUEST_APPROVED");
        assert_eq!(value["payload"]["id"], 42);
        assert_eq!(event.kind().as_str(), "ENROLLMENT_REQUEST_APPROVED");
        assert_eq!(event.record_id(), 42);
    }
}
