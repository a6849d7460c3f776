use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A student record as stored by the students service and returned over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub fullname: String,
    pub date_of_birth: NaiveDate,
    /// School grade (0-11). Serialized only when non-zero.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub grade: i32,
    pub phone: i64,
}

/// Write payload for creating or replacing a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub fullname: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub grade: i32,
    pub phone: i64,
}

impl NewStudent {
    /// Materialize the payload into a stored row with the given id.
    #[must_use]
    pub fn into_student(self, id: i64) -> Student {
        Student {
            id,
            fullname: self.fullname,
            date_of_birth: self.date_of_birth,
            grade: self.grade,
            phone: self.phone,
        }
    }
}

/// A course record owned by the courses service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
}

/// Write payload for creating or renaming a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub name: String,
}

/// Link between a student and a course. Lives in the students service store;
/// the course itself is resolved remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /students/{id}/courses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEnrollment {
    pub course_id: i64,
}

/// A user account managed by the accounts service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Write payload for creating an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub full_name: String,
    pub email: String,
}

/// Partial update for an account; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Pagination window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// Limit applied when the caller passes `0`.
    pub const DEFAULT_LIMIT: u32 = 100;

    /// Build a page, substituting [`Page::DEFAULT_LIMIT`] for a zero limit.
    #[must_use]
    pub fn new(limit: u32, offset: u32) -> Self {
        let limit = if limit == 0 { Self::DEFAULT_LIMIT } else { limit };
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &i32) -> bool {
    *v == 0
}
