use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    common::{ListResponse, MessageResponse},
    error::AppError,
    routes::parse_id,
    utils::{Claims, success_to_api_response},
};

use super::model::NotificationQuery;

#[axum::debug_handler]
pub async fn fetch_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let unread = state.notifications.list_unread(claims.user_id()).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(ListResponse::from(unread)),
    ))
}

#[axum::debug_handler]
pub async fn update_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(query.notification_id.as_deref(), "notificationId")?;
    state.notifications.mark_read(claims.user_id(), id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(MessageResponse::new("Notification marked as read")),
    ))
}
