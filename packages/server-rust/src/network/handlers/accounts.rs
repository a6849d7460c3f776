//! Accounts service endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use lms_core::{AccountUpdate, NewAccount};

use super::{respond, ApiError, AppState, RequestId};
use crate::service::{methods, Operation};

pub async fn create_account(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return respond(Err(ApiError::from(rejection))),
    };
    respond(
        state
            .run(methods::CREATE_ACCOUNT, request_id, |ctx| Operation::CreateAccount {
                ctx,
                payload,
            })
            .await,
    )
}

pub async fn get_account(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(username): Path<String>,
) -> Response {
    respond(
        state
            .run(methods::GET_ACCOUNT, request_id, |ctx| Operation::GetAccount { ctx, username })
            .await,
    )
}

pub async fn update_account(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(username): Path<String>,
    update: Result<Json<AccountUpdate>, JsonRejection>,
) -> Response {
    let update = match update {
        Ok(Json(update)) => update,
        Err(rejection) => return respond(Err(ApiError::from(rejection))),
    };
    respond(
        state
            .run(methods::UPDATE_ACCOUNT, request_id, |ctx| Operation::UpdateAccount {
                ctx,
                username,
                update,
            })
            .await,
    )
}
