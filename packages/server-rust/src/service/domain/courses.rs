//! Courses service: course CRUD plus the roster view served by the
//! students service.

use std::sync::Arc;

use lms_core::{parse_id, Course, NewCourse};

use super::not_handled;
use crate::client::CourseStudentsClient;
use crate::service::operation::{
    methods, Operation, OperationContext, OperationError, OperationResponse,
};
use crate::traits::CourseQuerier;

pub struct CourseService {
    store: Arc<dyn CourseQuerier>,
    students: Option<CourseStudentsClient>,
}

impl CourseService {
    pub const METHODS: &'static [&'static str] = &[
        methods::GET_COURSE,
        methods::LIST_COURSES,
        methods::CREATE_COURSE,
        methods::UPDATE_COURSE,
        methods::DELETE_COURSE,
        methods::GET_COURSE_STUDENTS,
    ];

    #[must_use]
    pub fn new(store: Arc<dyn CourseQuerier>, students: Option<CourseStudentsClient>) -> Self {
        Self { store, students }
    }

    async fn handle(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        match op {
            Operation::GetCourse { id, .. } => self.find(&id).await.map(OperationResponse::Course),
            Operation::ListCourses { page, .. } => Ok(OperationResponse::Courses(
                self.store.list_courses(page).await?,
            )),
            Operation::CreateCourse { payload, .. } => {
                validate(&payload)?;
                Ok(OperationResponse::Course(
                    self.store.create_course(payload).await?,
                ))
            }
            Operation::UpdateCourse { id, payload, .. } => {
                validate(&payload)?;
                self.store
                    .update_course(parse_id(&id)?, payload)
                    .await?
                    .map(OperationResponse::Course)
                    .ok_or_else(|| course_not_found(id))
            }
            Operation::DeleteCourse { id, .. } => {
                if self.store.delete_course(parse_id(&id)?).await? {
                    Ok(OperationResponse::Deleted)
                } else {
                    Err(course_not_found(id))
                }
            }
            Operation::GetCourseStudents { ctx, course_id } => {
                self.roster(&ctx, &course_id).await
            }
            other => Err(not_handled(&other)),
        }
    }

    async fn find(&self, id: &str) -> Result<Course, OperationError> {
        self.store
            .get_course(parse_id(id)?)
            .await?
            .ok_or_else(|| course_not_found(id.to_string()))
    }

    async fn roster(
        &self,
        ctx: &OperationContext,
        course_id: &str,
    ) -> Result<OperationResponse, OperationError> {
        let course = self.find(course_id).await?;
        let client = self
            .students
            .as_ref()
            .ok_or_else(|| OperationError::configuration("no students peer configured"))?;
        let students = client.call(ctx, &course.id.to_string()).await?;
        Ok(OperationResponse::Students(students))
    }
}

operation_service!(CourseService);

fn course_not_found(id: String) -> OperationError {
    OperationError::NotFound {
        entity: "course",
        id,
    }
}

fn validate(payload: &NewCourse) -> Result<(), OperationError> {
    if payload.name.trim().is_empty() {
        return Err(OperationError::validation("name must not be empty"));
    }
    Ok(())
}
