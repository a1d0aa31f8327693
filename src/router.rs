use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
};

use crate::{
    AppState,
    config::Config,
    middleware::{
        ADMIN, ANY_ROLE, AccessGuard, DONOR, RateLimiter, STAFF, access_guard, log_errors,
        rate_limit,
    },
    models::Role,
    routes,
};

fn guarded(
    router: Router<AppState>,
    config: &Arc<Config>,
    allowed: &'static [Role],
) -> Router<AppState> {
    router.route_layer(from_fn_with_state(
        AccessGuard::new(config.clone(), Some(allowed)),
        access_guard,
    ))
}

/// Authentication endpoints; rate limited when Redis is configured.
fn auth_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/google", get(routes::auth::google_start))
        .route("/auth/google/callback", get(routes::auth::google_callback))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/reset-password", post(routes::auth::reset_password));

    match &state.redis {
        Some(redis) => {
            let limiter = Arc::new(RateLimiter::new(redis.clone(), state.config.clone()));
            router.route_layer(from_fn_with_state(limiter, rate_limit))
        }
        None => router,
    }
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/donation-options", get(routes::options::donation_options))
        .route("/health", get(routes::options::health))
}

fn donor_routes(config: &Arc<Config>) -> Router<AppState> {
    let router = Router::new().route("/add-donation", post(routes::donation::add_donation));
    guarded(router, config, DONOR)
}

fn member_routes(config: &Arc<Config>) -> Router<AppState> {
    let router = Router::new()
        .route("/fetch-donations", get(routes::donation::fetch_donations))
        .route("/fetch-donation", get(routes::donation::fetch_donation))
        .route("/donation-images", get(routes::donation::donation_images))
        .route(
            "/fetch-donationcount",
            get(routes::donation::fetch_donation_count),
        )
        .route(
            "/fetch-notifications",
            get(routes::notification::fetch_notifications),
        )
        .route(
            "/update-notification",
            patch(routes::notification::update_notification),
        )
        .route("/fetch-userinfo", get(routes::user::fetch_userinfo))
        .route("/update-userinfo", put(routes::user::update_userinfo))
        .route("/delete-own-user", delete(routes::user::delete_own_user));
    guarded(router, config, ANY_ROLE)
}

fn staff_routes(config: &Arc<Config>) -> Router<AppState> {
    let router = Router::new()
        .route("/update-donation", patch(routes::donation::update_donation))
        .route(
            "/update-donation-status",
            patch(routes::donation::update_donation_status),
        )
        .route(
            "/donation-logistics",
            get(routes::donation::donation_logistics),
        );
    guarded(router, config, STAFF)
}

fn admin_routes(config: &Arc<Config>) -> Router<AppState> {
    let router = Router::new()
        .route("/staff-donations", get(routes::donation::staff_donations))
        .route("/delete-donation", delete(routes::donation::delete_donation))
        .route("/fetch-users", get(routes::user::fetch_users))
        .route("/create-users", post(routes::user::create_users))
        .route("/update-users", put(routes::user::update_users))
        .route("/delete-users", delete(routes::user::delete_users));
    guarded(router, config, ADMIN)
}

/// Full application router, mounted under `api_base_uri`.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let api = Router::new()
        .merge(auth_routes(&state))
        .merge(public_routes())
        .merge(donor_routes(&config))
        .merge(member_routes(&config))
        .merge(staff_routes(&config))
        .merge(admin_routes(&config));

    let base = config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };
    let router = router.layer(from_fn(log_errors));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
