pub mod auth;
mod error_handler;
mod rate_limit;

pub use auth::{ADMIN, ANY_ROLE, AccessGuard, DONOR, STAFF, access_guard};
pub use error_handler::log_errors;
pub use rate_limit::{RateLimiter, client_ip, rate_limit};
