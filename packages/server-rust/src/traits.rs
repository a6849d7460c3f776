use async_trait::async_trait;
use lms_core::{
    Account, AccountUpdate, Course, Enrollment, NewAccount, NewCourse, NewStudent, Page, Student,
};

/// Persistence for student rows and their enrollments.
///
/// `Ok(None)` / `Ok(false)` mean the row does not exist; `Err` is reserved
/// for the store itself failing.
#[async_trait]
pub trait StudentQuerier: Send + Sync {
    async fn get_student(&self, id: i64) -> anyhow::Result<Option<Student>>;

    async fn list_students(&self, page: Page) -> anyhow::Result<Vec<Student>>;

    async fn create_student(&self, payload: NewStudent) -> anyhow::Result<Student>;

    /// Replace every field of an existing student.
    async fn update_student(&self, id: i64, payload: NewStudent)
        -> anyhow::Result<Option<Student>>;

    async fn delete_student(&self, id: i64) -> anyhow::Result<bool>;

    async fn create_enrollment(&self, student_id: i64, course_id: i64)
        -> anyhow::Result<Enrollment>;

    /// Enrollments of one student, oldest first.
    async fn enrollments_by_student(
        &self,
        student_id: i64,
        page: Page,
    ) -> anyhow::Result<Vec<Enrollment>>;

    /// Students enrolled in one course, ordered by student id.
    async fn students_by_course(&self, course_id: i64, page: Page)
        -> anyhow::Result<Vec<Student>>;
}

/// Persistence for course rows.
#[async_trait]
pub trait CourseQuerier: Send + Sync {
    async fn get_course(&self, id: i64) -> anyhow::Result<Option<Course>>;

    async fn list_courses(&self, page: Page) -> anyhow::Result<Vec<Course>>;

    async fn create_course(&self, payload: NewCourse) -> anyhow::Result<Course>;

    async fn update_course(&self, id: i64, payload: NewCourse) -> anyhow::Result<Option<Course>>;

    async fn delete_course(&self, id: i64) -> anyhow::Result<bool>;
}

/// Persistence for accounts, keyed by username.
#[async_trait]
pub trait AccountQuerier: Send + Sync {
    /// Returns `Ok(None)` when the username is already taken.
    async fn create_account(&self, payload: NewAccount) -> anyhow::Result<Option<Account>>;

    async fn get_account(&self, username: &str) -> anyhow::Result<Option<Account>>;

    /// Applies the fields present in `update`.
    async fn update_account(
        &self,
        username: &str,
        update: AccountUpdate,
    ) -> anyhow::Result<Option<Account>>;
}
