use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::{AppState, utils::success_to_api_response};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Reference dimensions for populating the donation form.
#[axum::debug_handler]
pub async fn donation_options(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(state.lookups.donation_options()),
    )
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, success_to_api_response(HealthResponse { status: "ok" }))
}
