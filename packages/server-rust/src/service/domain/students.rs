//! Students service: student records, enrollments and the course fan-out.

use std::sync::Arc;

use lms_core::{parse_id, Enrollment, NewEnrollment, NewStudent, Page, Student};

use super::{not_handled, RELATION_SCAN_LIMIT};
use crate::client::CourseClient;
use crate::service::config::FanOutConfig;
use crate::service::fanout::resolve_many;
use crate::service::operation::{
    methods, Operation, OperationContext, OperationError, OperationResponse,
};
use crate::traits::StudentQuerier;

/// Grades run from 0 (not set) to 11.
const MAX_GRADE: i32 = 11;

pub struct StudentService {
    store: Arc<dyn StudentQuerier>,
    courses: Option<CourseClient>,
    fan_out: FanOutConfig,
}

impl StudentService {
    pub const METHODS: &'static [&'static str] = &[
        methods::GET_STUDENT,
        methods::LIST_STUDENTS,
        methods::CREATE_STUDENT,
        methods::UPDATE_STUDENT,
        methods::DELETE_STUDENT,
        methods::GET_STUDENT_COURSES,
        methods::ENROLL_STUDENT,
        methods::GET_COURSE_STUDENTS,
    ];

    #[must_use]
    pub fn new(
        store: Arc<dyn StudentQuerier>,
        courses: Option<CourseClient>,
        fan_out: FanOutConfig,
    ) -> Self {
        Self {
            store,
            courses,
            fan_out,
        }
    }

    async fn handle(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        match op {
            Operation::GetStudent { id, .. } => {
                self.find(&id).await.map(OperationResponse::Student)
            }
            Operation::ListStudents { page, .. } => Ok(OperationResponse::Students(
                self.store.list_students(page).await?,
            )),
            Operation::CreateStudent { payload, .. } => {
                validate(&payload)?;
                Ok(OperationResponse::Student(
                    self.store.create_student(payload).await?,
                ))
            }
            Operation::UpdateStudent { id, payload, .. } => {
                validate(&payload)?;
                let key = parse_id(&id)?;
                self.store
                    .update_student(key, payload)
                    .await?
                    .map(OperationResponse::Student)
                    .ok_or_else(|| student_not_found(id))
            }
            Operation::DeleteStudent { id, .. } => {
                if self.store.delete_student(parse_id(&id)?).await? {
                    Ok(OperationResponse::Deleted)
                } else {
                    Err(student_not_found(id))
                }
            }
            Operation::GetStudentCourses { ctx, id } => self.student_courses(&ctx, &id).await,
            Operation::EnrollStudent { ctx, id, payload } => self
                .enroll(&ctx, &id, payload)
                .await
                .map(OperationResponse::Enrollment),
            Operation::GetCourseStudents { course_id, .. } => {
                let key = parse_id(&course_id)?;
                let students = self
                    .store
                    .students_by_course(key, Page::new(RELATION_SCAN_LIMIT, 0))
                    .await?;
                Ok(OperationResponse::Students(students))
            }
            other => Err(not_handled(&other)),
        }
    }

    async fn find(&self, id: &str) -> Result<Student, OperationError> {
        self.store
            .get_student(parse_id(id)?)
            .await?
            .ok_or_else(|| student_not_found(id.to_string()))
    }

    fn course_client(&self) -> Result<&CourseClient, OperationError> {
        self.courses
            .as_ref()
            .ok_or_else(|| OperationError::configuration("no courses peer configured"))
    }

    /// Resolves every enrolled course through the courses service.
    async fn student_courses(
        &self,
        ctx: &OperationContext,
        id: &str,
    ) -> Result<OperationResponse, OperationError> {
        let student = self.find(id).await?;
        let client = self.course_client()?;
        let enrollments = self
            .store
            .enrollments_by_student(student.id, Page::new(RELATION_SCAN_LIMIT, 0))
            .await?;
        let course_ids: Vec<String> = enrollments
            .iter()
            .map(|e| e.course_id.to_string())
            .collect();

        let courses = resolve_many(ctx, id, &course_ids, self.fan_out, |unit, course_id| {
            let client = client.clone();
            async move { client.call(&unit, &course_id).await }
        })
        .await?;
        Ok(OperationResponse::Courses(courses))
    }

    /// Links a student to a course. The course is checked against the
    /// courses service when one is configured.
    async fn enroll(
        &self,
        ctx: &OperationContext,
        id: &str,
        payload: NewEnrollment,
    ) -> Result<Enrollment, OperationError> {
        if payload.course_id <= 0 {
            return Err(OperationError::validation("course_id must be positive"));
        }
        let student = self.find(id).await?;
        if let Some(client) = &self.courses {
            client.call(ctx, &payload.course_id.to_string()).await?;
        }
        Ok(self
            .store
            .create_enrollment(student.id, payload.course_id)
            .await?)
    }
}

operation_service!(StudentService);

fn student_not_found(id: String) -> OperationError {
    OperationError::NotFound {
        entity: "student",
        id,
    }
}

fn validate(payload: &NewStudent) -> Result<(), OperationError> {
    if payload.fullname.trim().is_empty() {
        return Err(OperationError::validation("fullname must not be empty"));
    }
    if !(0..=MAX_GRADE).contains(&payload.grade) {
        return Err(OperationError::validation(format!(
            "grade must be between 0 and {MAX_GRADE}, got {}",
            payload.grade
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use lms_core::ErrorKind;
    use tower::ServiceExt;

    use super::*;
    use crate::service::domain::test_support::stub_course_client;
    use crate::service::operation::service_names;
    use crate::storage::MemoryStore;

    fn ctx(method: &'static str) -> OperationContext {
        OperationContext::new(1, service_names::STUDENTS, method, Duration::from_secs(5))
    }

    fn payload(name: &str, grade: i32) -> NewStudent {
        NewStudent {
            fullname: name.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 2, 3).unwrap(),
            grade,
            phone: 87_000_000_001,
        }
    }

    async fn service_with(
        enrolled: &[i64],
        missing: &'static [&'static str],
    ) -> Arc<StudentService> {
        let store = Arc::new(MemoryStore::new());
        let student = store.create_student(payload("Aibek", 4)).await.unwrap();
        for &course in enrolled {
            store.create_enrollment(student.id, course).await.unwrap();
        }
        Arc::new(StudentService::new(
            store,
            Some(stub_course_client(missing)),
            FanOutConfig::default(),
        ))
    }

    #[tokio::test]
    async fn get_student_parses_and_finds() {
        let svc = service_with(&[], &[]).await;
        let resp = svc
            .clone()
            .oneshot(Operation::GetStudent {
                ctx: ctx(methods::GET_STUDENT),
                id: "1".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(resp, OperationResponse::Student(s) if s.fullname == "Aibek"));

        let err = svc
            .clone()
            .oneshot(Operation::GetStudent {
                ctx: ctx(methods::GET_STUDENT),
                id: "abc".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = svc
            .oneshot(Operation::GetStudent {
                ctx: ctx(methods::GET_STUDENT),
                id: "42".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::NotFound { entity: "student", .. }));
    }

    #[tokio::test]
    async fn student_courses_fans_out_in_enrollment_order() {
        let svc = service_with(&[3, 1, 2], &[]).await;
        let resp = svc
            .oneshot(Operation::GetStudentCourses {
                ctx: ctx(methods::GET_STUDENT_COURSES),
                id: "1".to_string(),
            })
            .await
            .unwrap();
        let OperationResponse::Courses(courses) = resp else {
            panic!("expected courses");
        };
        let ids: Vec<i64> = courses.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn student_without_enrollments_has_no_courses() {
        let svc = service_with(&[], &[]).await;
        let resp = svc
            .oneshot(Operation::GetStudentCourses {
                ctx: ctx(methods::GET_STUDENT_COURSES),
                id: "1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(resp, OperationResponse::Courses(Vec::new()));
    }

    #[tokio::test]
    async fn one_unreachable_course_fails_the_view() {
        let svc = service_with(&[1, 13, 2], &[]).await;
        let err = svc
            .oneshot(Operation::GetStudentCourses {
                ctx: ctx(methods::GET_STUDENT_COURSES),
                id: "1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_aggregate());
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert!(matches!(err, OperationError::Aggregate { ref related_id, .. } if related_id == "13"));
    }

    #[tokio::test]
    async fn enroll_checks_course_exists() {
        let svc = service_with(&[], &["9"]).await;
        let err = svc
            .clone()
            .oneshot(Operation::EnrollStudent {
                ctx: ctx(methods::ENROLL_STUDENT),
                id: "1".to_string(),
                payload: NewEnrollment { course_id: 9 },
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::NotFound { entity: "course", .. }));

        let resp = svc
            .clone()
            .oneshot(Operation::EnrollStudent {
                ctx: ctx(methods::ENROLL_STUDENT),
                id: "1".to_string(),
                payload: NewEnrollment { course_id: 4 },
            })
            .await
            .unwrap();
        assert!(matches!(resp, OperationResponse::Enrollment(e) if e.course_id == 4));

        let resp = svc
            .oneshot(Operation::GetCourseStudents {
                ctx: ctx(methods::GET_COURSE_STUDENTS),
                course_id: "4".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(resp, OperationResponse::Students(list) if list.len() == 1));
    }

    #[tokio::test]
    async fn create_rejects_bad_grade() {
        let svc = service_with(&[], &[]).await;
        let err = svc
            .oneshot(Operation::CreateStudent {
                ctx: ctx(methods::CREATE_STUDENT),
                payload: payload("Zere", 14),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn delete_missing_student_is_not_found() {
        let svc = service_with(&[], &[]).await;
        let op = |id: &str| Operation::DeleteStudent {
            ctx: ctx(methods::DELETE_STUDENT),
            id: id.to_string(),
        };
        assert_eq!(svc.clone().oneshot(op("1")).await.unwrap(), OperationResponse::Deleted);
        let err = svc.oneshot(op("1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn foreign_operation_is_unknown() {
        let svc = service_with(&[], &[]).await;
        let err = svc
            .oneshot(Operation::GetCourse {
                ctx: ctx(methods::GET_COURSE),
                id: "1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::UnknownMethod { .. }));
    }
}
