use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    AppState,
    common::{ListResponse, MessageResponse},
    error::AppError,
    utils::{Claims, success_to_api_response},
};

use super::model::{
    CreateUsersRequest, DeleteUsersRequest, UpdateUserInfoRequest, UpdateUsersRequest,
    new_accounts,
};

#[derive(Debug, Serialize)]
struct DeletedUsersResponse {
    deleted: u64,
}

#[axum::debug_handler]
pub async fn fetch_userinfo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.profile(claims.user_id()).await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn update_userinfo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserInfoRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .update_profile(claims.user_id(), req.into())
        .await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn delete_own_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    state.users.delete_own(claims.user_id()).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(MessageResponse::new(
            "Profile and all associated data deleted",
        )),
    ))
}

#[axum::debug_handler]
pub async fn fetch_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state.users.list_users().await?;
    Ok((StatusCode::OK, success_to_api_response(ListResponse::from(users))))
}

#[axum::debug_handler]
pub async fn create_users(
    State(state): State<AppState>,
    Json(req): Json<CreateUsersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let accounts = new_accounts(req.users).map_err(AppError::Validation)?;
    let created = state.users.create_users(accounts).await?;
    Ok((
        StatusCode::CREATED,
        success_to_api_response(ListResponse::from(created)),
    ))
}

#[axum::debug_handler]
pub async fn update_users(
    State(state): State<AppState>,
    Json(req): Json<UpdateUsersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let changes = req.users.into_iter().map(Into::into).collect();
    let updated = state.users.update_users(changes).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(ListResponse::from(updated)),
    ))
}

#[axum::debug_handler]
pub async fn delete_users(
    State(state): State<AppState>,
    Json(req): Json<DeleteUsersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state.users.delete_users(req.user_ids).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(DeletedUsersResponse { deleted }),
    ))
}
