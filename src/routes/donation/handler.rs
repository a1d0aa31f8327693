use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    common::{ListResponse, MessageResponse},
    error::AppError,
    routes::{caller_role, parse_id},
    utils::{Claims, success_to_api_response},
};

use super::model::{CreateDonationRequest, DonationQuery, UpdateDonationRequest, UpdateStatusRequest};

fn donation_id(query: &DonationQuery) -> Result<i64, AppError> {
    parse_id(query.donation_id.as_deref(), "donationId")
}

#[axum::debug_handler]
pub async fn add_donation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDonationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let donation = state
        .donations
        .create(claims.user_id(), req.into())
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(donation)))
}

#[axum::debug_handler]
pub async fn fetch_donations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let donations = state.donations.list_own(claims.user_id()).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(ListResponse::from(donations)),
    ))
}

#[axum::debug_handler]
pub async fn fetch_donation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DonationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = donation_id(&query)?;
    let donation = state
        .donations
        .get(claims.user_id(), caller_role(&claims)?, id)
        .await?;
    Ok((StatusCode::OK, success_to_api_response(donation)))
}

#[axum::debug_handler]
pub async fn donation_images(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DonationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = donation_id(&query)?;
    let images = state
        .donations
        .images(claims.user_id(), caller_role(&claims)?, id)
        .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(ListResponse::from(images)),
    ))
}

#[axum::debug_handler]
pub async fn fetch_donation_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.donations.stats(claims.user_id()).await?;
    Ok((StatusCode::OK, success_to_api_response(stats)))
}

#[axum::debug_handler]
pub async fn staff_donations(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let queue = state.donations.staff_queue().await?;
    Ok((StatusCode::OK, success_to_api_response(ListResponse::from(queue))))
}

#[axum::debug_handler]
pub async fn update_donation(
    State(state): State<AppState>,
    Query(query): Query<DonationQuery>,
    Json(req): Json<UpdateDonationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = donation_id(&query)?;
    let donation = state.donations.update(id, req.into()).await?;
    Ok((StatusCode::OK, success_to_api_response(donation)))
}

#[axum::debug_handler]
pub async fn update_donation_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DonationQuery>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = donation_id(&query)?;
    let status_id = req
        .status_id
        .ok_or_else(|| AppError::validation("status_id is required"))?;
    let donation = state.donations.advance_status(id, status_id).await?;
    tracing::debug!("Staff user {} set donation {} to {}", claims.user_id(), id, status_id);
    Ok((StatusCode::OK, success_to_api_response(donation)))
}

#[axum::debug_handler]
pub async fn donation_logistics(
    State(state): State<AppState>,
    Query(query): Query<DonationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = donation_id(&query)?;
    let record = state.donations.logistics_record(id)?;
    Ok((StatusCode::OK, success_to_api_response(record)))
}

#[axum::debug_handler]
pub async fn delete_donation(
    State(state): State<AppState>,
    Query(query): Query<DonationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let id = donation_id(&query)?;
    state.donations.delete(id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(MessageResponse::new("Donation deleted")),
    ))
}
