//! Students service endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use lms_core::{NewEnrollment, NewStudent};

use super::{respond, ApiError, AppState, ListParams, RequestId};
use crate::service::{methods, Operation};

pub async fn list_students(
    State(state): State<AppState>,
    request_id: RequestId,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response {
    let page = match params {
        Ok(Query(params)) => params.page(),
        Err(rejection) => return respond(Err(rejection.into())),
    };
    respond(
        state
            .run(methods::LIST_STUDENTS, request_id, |ctx| Operation::ListStudents { ctx, page })
            .await,
    )
}

pub async fn get_student(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
) -> Response {
    respond(
        state
            .run(methods::GET_STUDENT, request_id, |ctx| Operation::GetStudent { ctx, id })
            .await,
    )
}

pub async fn create_student(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<NewStudent>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return respond(Err(ApiError::from(rejection))),
    };
    respond(
        state
            .run(methods::CREATE_STUDENT, request_id, |ctx| Operation::CreateStudent {
                ctx,
                payload,
            })
            .await,
    )
}

pub async fn update_student(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
    payload: Result<Json<NewStudent>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return respond(Err(ApiError::from(rejection))),
    };
    respond(
        state
            .run(methods::UPDATE_STUDENT, request_id, |ctx| Operation::UpdateStudent {
                ctx,
                id,
                payload,
            })
            .await,
    )
}

pub async fn delete_student(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
) -> Response {
    respond(
        state
            .run(methods::DELETE_STUDENT, request_id, |ctx| Operation::DeleteStudent { ctx, id })
            .await,
    )
}

/// `GET /students/{id}/courses`: the fan-out over the courses service.
pub async fn get_student_courses(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
) -> Response {
    respond(
        state
            .run(methods::GET_STUDENT_COURSES, request_id, |ctx| {
                Operation::GetStudentCourses { ctx, id }
            })
            .await,
    )
}

pub async fn enroll_student(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
    payload: Result<Json<NewEnrollment>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return respond(Err(ApiError::from(rejection))),
    };
    respond(
        state
            .run(methods::ENROLL_STUDENT, request_id, |ctx| Operation::EnrollStudent {
                ctx,
                id,
                payload,
            })
            .await,
    )
}

/// `GET /courses/{id}/students` as served by the students service: the
/// local roster the courses service asks for.
pub async fn get_course_students(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(course_id): Path<String>,
) -> Response {
    respond(
        state
            .run(methods::GET_COURSE_STUDENTS, request_id, |ctx| {
                Operation::GetCourseStudents { ctx, course_id }
            })
            .await,
    )
}
