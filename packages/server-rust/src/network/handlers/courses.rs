//! Courses service endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use lms_core::NewCourse;

use super::{respond, ApiError, AppState, ListParams, RequestId};
use crate::service::{methods, Operation};

pub async fn list_courses(
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
            .run(methods::LIST_COURSES, request_id, |ctx| Operation::ListCourses { ctx, page })
            .await,
    )
}

pub async fn get_course(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
) -> Response {
    respond(
        state
            .run(methods::GET_COURSE, request_id, |ctx| Operation::GetCourse { ctx, id })
            .await,
    )
}

pub async fn create_course(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<NewCourse>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return respond(Err(ApiError::from(rejection))),
    };
    respond(
        state
            .run(methods::CREATE_COURSE, request_id, |ctx| Operation::CreateCourse {
                ctx,
                payload,
            })
            .await,
    )
}

pub async fn update_course(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
    payload: Result<Json<NewCourse>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return respond(Err(ApiError::from(rejection))),
    };
    respond(
        state
            .run(methods::UPDATE_COURSE, request_id, |ctx| Operation::UpdateCourse {
                ctx,
                id,
                payload,
            })
            .await,
    )
}

pub async fn delete_course(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<String>,
) -> Response {
    respond(
        state
            .run(methods::DELETE_COURSE, request_id, |ctx| Operation::DeleteCourse { ctx, id })
            .await,
    )
}

/// `GET /courses/{id}/students`, answered by the students service.
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
