use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::config::Config;
use crate::error::AppError;
use crate::models::Role;
use crate::utils::{Claims, verify_token};

pub const ANY_ROLE: &[Role] = &[Role::Donor, Role::CharityStaff, Role::Administrator];
pub const DONOR: &[Role] = &[Role::Donor];
pub const STAFF: &[Role] = &[Role::CharityStaff, Role::Administrator];
pub const ADMIN: &[Role] = &[Role::Administrator];

/// Per-route bearer check. `allowed: None` accepts any valid token.
#[derive(Clone)]
pub struct AccessGuard {
    config: Arc<Config>,
    allowed: Option<&'static [Role]>,
}

impl AccessGuard {
    pub fn new(config: Arc<Config>, allowed: Option<&'static [Role]>) -> Self {
        Self { config, allowed }
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<Claims, AppError> {
        let bearer = headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or_else(|| AppError::Unauthenticated("Missing bearer token".to_string()))?;
        let token = bearer.token().trim();
        if token.is_empty() {
            return Err(AppError::Unauthenticated("Missing bearer token".to_string()));
        }

        let claims = verify_token(token, &self.config).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AppError::TokenInvalid
        })?;

        if let Some(allowed) = self.allowed {
            let permitted = claims.role().is_some_and(|role| allowed.contains(&role));
            if !permitted {
                return Err(AppError::forbidden(
                    "You do not have permission to perform this action",
                ));
            }
        }
        Ok(claims)
    }
}

pub async fn access_guard(
    State(guard): State<AccessGuard>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = guard.check(req.headers())?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
