use std::ops::Deref;

use async_trait::async_trait;
use serde::Serialize;

use crate::api::{ApiError, Course, Grade, GradeUpdate, NewGrade, SchoolApi};
use crate::bus::{AppEvent, EventKind, RecordRef};
use crate::refresh::RefreshError;
use crate::store::slice::{remove_by_key, upsert, LiveSlice, SliceSource, StoreContext};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoursesAndGrades {
    pub courses: Vec<Course>,
    pub grades: Vec<Grade>,
}

/// Courses and the grades recorded in them, as the teacher gradebook and the
/// student report card show them.
pub struct CoursesGradesSource;

#[async_trait]
impl SliceSource for CoursesGradesSource {
    type Data = CoursesAndGrades;

    const NAME: &'static str = "courses_grades";

    fn stale_on(&self) -> &'static [EventKind] {
        &[
            EventKind::GradeCreated,
            EventKind::GradeUpdated,
            EventKind::GradeDeleted,
            EventKind::CourseRequestApproved,
        ]
    }

    async fn load(&self, api: &dyn SchoolApi) -> Result<Self::Data, ApiError> {
        let (courses, grades) = futures::try_join!(api.list_courses(), api.list_grades())?;
        Ok(CoursesAndGrades { courses, grades })
    }
}

pub struct CoursesGradesStore {
    slice: LiveSlice<CoursesGradesSource>,
}

impl CoursesGradesStore {
    pub async fn mount(ctx: &StoreContext) -> Result<Self, RefreshError> {
        Ok(Self {
            slice: LiveSlice::mount(CoursesGradesSource, ctx).await?,
        })
    }

    pub fn grades_for_course(&self, course_id: i64) -> Vec<Grade> {
        self.slice.with_data(|data| {
            data.grades
                .iter()
                .filter(|grade| grade.course_id == course_id)
                .cloned()
                .collect()
        })
    }

    pub fn grades_for_student(&self, student_id: i64) -> Vec<Grade> {
        self.slice.with_data(|data| {
            data.grades
                .iter()
                .filter(|grade| grade.student_id == student_id)
                .cloned()
                .collect()
        })
    }

    /// Mean score in a course, `None` when nothing is graded yet.
    pub fn average_for_course(&self, course_id: i64) -> Option<f64> {
        self.slice.with_data(|data| {
            let scores: Vec<f64> = data
                .grades
                .iter()
                .filter(|grade| grade.course_id == course_id)
                .map(|grade| grade.score)
                .collect();
            if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f64>() / scores.len() as f64)
            }
        })
    }

    pub async fn create_grade(&self, grade: NewGrade) -> Result<Grade, ApiError> {
        let created = self.slice.api().create_grade(grade).await?;
        self.slice
            .patch(|data| upsert(&mut data.grades, created.clone()));
        self.slice.emit(AppEvent::GradeCreated(created.clone()));
        Ok(created)
    }

    pub async fn update_grade(&self, id: i64, update: GradeUpdate) -> Result<Grade, ApiError> {
        let updated = self.slice.api().update_grade(id, update).await?;
        self.slice
            .patch(|data| upsert(&mut data.grades, updated.clone()));
        self.slice.emit(AppEvent::GradeUpdated(updated.clone()));
        Ok(updated)
    }

    pub async fn delete_grade(&self, id: i64) -> Result<(), ApiError> {
        self.slice.api().delete_grade(id).await?;
        self.slice.patch(|data| remove_by_key(&mut data.grades, id));
        self.slice.emit(AppEvent::GradeDeleted(RecordRef { id }));
        Ok(())
    }

    pub fn unmount(self) {
        self.slice.unmount();
    }
}

impl Deref for CoursesGradesStore {
    type Target = LiveSlice<CoursesGradesSource>;

    fn deref(&self) -> &Self::Target {
        &self.slice
    }
}
