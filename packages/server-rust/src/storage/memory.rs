//! In-memory querier backed by [`DashMap`].
//!
//! Implements all three querier traits so one instance can back any service
//! kind. Ids are assigned from per-table counters starting at 1.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lms_core::{
    Account, AccountUpdate, Course, Enrollment, NewAccount, NewCourse, NewStudent, Page, Student,
};

use crate::traits::{AccountQuerier, CourseQuerier, StudentQuerier};

pub struct MemoryStore {
    students: DashMap<i64, Student>,
    courses: DashMap<i64, Course>,
    enrollments: DashMap<i64, Enrollment>,
    accounts: DashMap<String, Account>,
    student_seq: AtomicI64,
    course_seq: AtomicI64,
    enrollment_seq: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            students: DashMap::new(),
            courses: DashMap::new(),
            enrollments: DashMap::new(),
            accounts: DashMap::new(),
            student_seq: AtomicI64::new(1),
            course_seq: AtomicI64::new(1),
            enrollment_seq: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorts by key and applies the page window.
fn paginate<T, K: Ord>(mut rows: Vec<T>, page: Page, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(&key);
    rows.into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl StudentQuerier for MemoryStore {
    async fn get_student(&self, id: i64) -> anyhow::Result<Option<Student>> {
        Ok(self.students.get(&id).map(|r| r.clone()))
    }

    async fn list_students(&self, page: Page) -> anyhow::Result<Vec<Student>> {
        let rows = self.students.iter().map(|r| r.clone()).collect();
        Ok(paginate(rows, page, |s: &Student| s.id))
    }

    async fn create_student(&self, payload: NewStudent) -> anyhow::Result<Student> {
        let id = self.student_seq.fetch_add(1, Ordering::Relaxed);
        let student = payload.into_student(id);
        self.students.insert(id, student.clone());
        Ok(student)
    }

    async fn update_student(
        &self,
        id: i64,
        payload: NewStudent,
    ) -> anyhow::Result<Option<Student>> {
        Ok(self.students.get_mut(&id).map(|mut row| {
            *row = payload.into_student(id);
            row.clone()
        }))
    }

    async fn delete_student(&self, id: i64) -> anyhow::Result<bool> {
        let removed = self.students.remove(&id).is_some();
        if removed {
            self.enrollments.retain(|_, e| e.student_id != id);
        }
        Ok(removed)
    }

    async fn create_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> anyhow::Result<Enrollment> {
        let id = self.enrollment_seq.fetch_add(1, Ordering::Relaxed);
        let enrollment = Enrollment {
            id,
            student_id,
            course_id,
            created_at: Utc::now(),
        };
        self.enrollments.insert(id, enrollment.clone());
        Ok(enrollment)
    }

    async fn enrollments_by_student(
        &self,
        student_id: i64,
        page: Page,
    ) -> anyhow::Result<Vec<Enrollment>> {
        let rows = self
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id)
            .map(|e| e.clone())
            .collect();
        Ok(paginate(rows, page, |e: &Enrollment| e.id))
    }

    async fn students_by_course(
        &self,
        course_id: i64,
        page: Page,
    ) -> anyhow::Result<Vec<Student>> {
        let mut ids: Vec<i64> = self
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .map(|e| e.student_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        let rows = ids
            .into_iter()
            .filter_map(|id| self.students.get(&id).map(|r| r.clone()))
            .collect();
        Ok(paginate(rows, page, |s: &Student| s.id))
    }
}

#[async_trait]
impl CourseQuerier for MemoryStore {
    async fn get_course(&self, id: i64) -> anyhow::Result<Option<Course>> {
        Ok(self.courses.get(&id).map(|r| r.clone()))
    }

    async fn list_courses(&self, page: Page) -> anyhow::Result<Vec<Course>> {
        let rows = self.courses.iter().map(|r| r.clone()).collect();
        Ok(paginate(rows, page, |c: &Course| c.id))
    }

    async fn create_course(&self, payload: NewCourse) -> anyhow::Result<Course> {
        let id = self.course_seq.fetch_add(1, Ordering::Relaxed);
        let course = Course {
            id,
            name: payload.name,
        };
        self.courses.insert(id, course.clone());
        Ok(course)
    }

    async fn update_course(&self, id: i64, payload: NewCourse) -> anyhow::Result<Option<Course>> {
        Ok(self.courses.get_mut(&id).map(|mut row| {
            row.name = payload.name;
            row.clone()
        }))
    }

    async fn delete_course(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.courses.remove(&id).is_some())
    }
}

#[async_trait]
impl AccountQuerier for MemoryStore {
    async fn create_account(&self, payload: NewAccount) -> anyhow::Result<Option<Account>> {
        match self.accounts.entry(payload.username.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let account = Account {
                    username: payload.username,
                    full_name: payload.full_name,
                    email: payload.email,
                    created_at: Utc::now(),
                };
                slot.insert(account.clone());
                Ok(Some(account))
            }
        }
    }

    async fn get_account(&self, username: &str) -> anyhow::Result<Option<Account>> {
        Ok(self.accounts.get(username).map(|r| r.clone()))
    }

    async fn update_account(
        &self,
        username: &str,
        update: AccountUpdate,
    ) -> anyhow::Result<Option<Account>> {
        Ok(self.accounts.get_mut(username).map(|mut row| {
            if let Some(full_name) = update.full_name {
                row.full_name = full_name;
            }
            if let Some(email) = update.email {
                row.email = email;
            }
            row.clone()
        }))
    }
}
