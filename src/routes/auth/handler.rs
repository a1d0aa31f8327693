use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use reqwest::Url;

use crate::{
    AppState,
    common::MessageResponse,
    config::Config,
    error::AppError,
    routes::required,
    services::auth::Session,
    utils::{generate_state_token, success_to_api_response, verify_state_token},
};

use super::model::{
    ForgotPasswordRequest, GoogleCallbackQuery, LoginRequest, RegisterRequest,
    ResetPasswordRequest,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = required(&req.email, "Email")?;
    let username = required(&req.username, "Username")?;
    let password = required(&req.password, "Password")?;

    let user = state.auth.register(email, username, password).await?;
    Ok((StatusCode::CREATED, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = required(&req.email, "Email")?;
    let password = required(&req.password, "Password")?;

    let session = state.auth.login(email, password, req.remember).await?;
    Ok((StatusCode::OK, success_to_api_response(session)))
}

#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = required(&req.email, "Email")?;
    state.auth.forgot_password(email).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(MessageResponse::new(
            "If that email is registered, a reset link has been sent",
        )),
    ))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = required(&req.token, "Token")?;
    let password = required(&req.new_password, "New password")?;
    state.auth.reset_password(token, password).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(MessageResponse::new("Password has been reset")),
    ))
}

#[axum::debug_handler]
pub async fn google_start(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::not_found("Google sign-in is not configured"))?;
    let csrf = generate_state_token(&state.config)?;
    let url = google
        .authorize_url(&csrf)
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Redirect::to(&url))
}

/// Always answers with a redirect to the frontend login page, carrying either
/// the session token or an error message.
#[axum::debug_handler]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<GoogleCallbackQuery>,
) -> Redirect {
    match complete_google_login(&state, query).await {
        Ok(session) => frontend_redirect(&state.config, "token", &session.token),
        Err(e) => {
            tracing::warn!("Google sign-in failed: {}", e);
            frontend_redirect(&state.config, "error", &e.public_message())
        }
    }
}

async fn complete_google_login(
    state: &AppState,
    query: GoogleCallbackQuery,
) -> Result<Session, AppError> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::not_found("Google sign-in is not configured"))?;
    if let Some(error) = query.error {
        return Err(AppError::Unauthenticated(format!(
            "Google sign-in was cancelled: {}",
            error
        )));
    }
    let valid_state = query
        .state
        .as_deref()
        .is_some_and(|s| verify_state_token(s, &state.config));
    if !valid_state {
        return Err(AppError::Unauthenticated(
            "Sign-in request expired, please try again".to_string(),
        ));
    }
    let code = required(&query.code, "Authorization code")?;

    let profile = google.fetch_profile(code).await.map_err(|e| {
        tracing::warn!("Google profile exchange failed: {}", e);
        AppError::Unauthenticated("Could not verify Google account".to_string())
    })?;
    state.auth.external_login(&profile).await
}

fn frontend_redirect(config: &Config, key: &str, value: &str) -> Redirect {
    let base = format!("{}/login", config.frontend_url.trim_end_matches('/'));
    match Url::parse_with_params(&base, &[(key, value)]) {
        Ok(url) => Redirect::to(url.as_str()),
        Err(e) => {
            tracing::error!("FRONTEND_URL is not a valid URL: {}", e);
            Redirect::to(&base)
        }
    }
}
