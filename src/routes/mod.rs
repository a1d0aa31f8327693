pub mod auth;
pub mod donation;
pub mod notification;
pub mod options;
pub mod user;

use crate::error::AppError;
use crate::models::Role;
use crate::utils::Claims;

/// Parses a required integer query parameter such as `donationId`.
pub(crate) fn parse_id(raw: Option<&str>, name: &str) -> Result<i64, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(format!("{} query parameter is required", name)))?;
    raw.parse()
        .map_err(|_| AppError::validation(format!("{} must be an integer", name)))
}

pub(crate) fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::validation(format!("{} is required", field)))
}

pub(crate) fn caller_role(claims: &Claims) -> Result<Role, AppError> {
    claims
        .role()
        .ok_or_else(|| AppError::forbidden("Unknown role"))
}
