//! Stores that each own one slice of server data.
//!
//! Every store follows the same shape:
//! - mounting subscribes to the events that make its slice stale, starts a
//!   fallback auto-refresh task and performs the first fetch
//! - `refetch` replaces the slice wholesale; failures keep the old data and
//!   set `error`
//! - mutations call exactly one API operation, patch the slice with the
//!   record the server returned and emit one event
//!
//! # Patch policy
//!
//! | Operation | Local effect | Event |
//! |---|---|---|
//! | create | append confirmed record | `*_CREATED` |
//! | update / review / assign | replace record by id | `*_UPDATED`, `*_APPROVED`, ... |
//! | delete | remove record by id | `*_DELETED` |
//!
//! A failed mutation returns its error and leaves the slice untouched. The
//! instance that emitted an event does not refetch on it; every other
//! subscriber does.
//!
//! A manual `refetch` is not serialized against the auto-refresh task. Two
//! overlapping fetches both write their result and the last one to finish
//! wins; the next event or tick corrects anything stale.

mod course_requests;
mod enrolled_subjects;
mod enrollment_requests;
mod feedback;
mod grades;
mod slice;

pub use course_requests::{CourseRequestsSource, CourseRequestsStore};
pub use enrolled_subjects::{EnrolledSubjectsSource, EnrolledSubjectsStore};
pub use enrollment_requests::{EnrollmentRequestsSource, EnrollmentRequestsStore};
pub use feedback::{FeedbackSource, FeedbackStore};
pub use grades::{CoursesAndGrades, CoursesGradesSource, CoursesGradesStore};
pub use slice::{LiveSlice, SliceSnapshot, SliceSource, StoreContext};
