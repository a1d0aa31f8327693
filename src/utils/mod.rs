use axum::Json;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::common::ApiResponse;
use crate::config::Config;
use crate::models::{Role, User};

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role_id: i32,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> i64 {
        self.sub
    }

    pub fn role(&self) -> Option<Role> {
        Role::try_from(self.role_id).ok()
    }
}

/// Issues a session token; `remember` selects the extended lifetime.
pub fn generate_token(
    user: &User,
    remember: bool,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let lifetime = if remember {
        config.jwt_remember_expiration()
    } else {
        config.jwt_expiration()
    };
    let now = Utc::now();
    let expiration = (now + Duration::seconds(lifetime.as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: user.user_id,
        email: user.email.clone(),
        role_id: user.role_id,
        iat: now.timestamp(),
        exp: expiration,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

const OAUTH_STATE_PURPOSE: &str = "google_oauth";
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    purpose: String,
    nonce: String,
    exp: i64,
}

/// Signed `state` parameter for the external identity redirect.
pub fn generate_state_token(config: &Config) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = StateClaims {
        purpose: OAUTH_STATE_PURPOSE.to_string(),
        nonce: Uuid::new_v4().simple().to_string(),
        exp: (Utc::now() + Duration::minutes(OAUTH_STATE_TTL_MINUTES)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

pub fn verify_state_token(state: &str, config: &Config) -> bool {
    decode::<StateClaims>(
        state,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.purpose == OAUTH_STATE_PURPOSE)
    .unwrap_or(false)
}

/// Random single-use token handed to the user; only its digest is stored.
pub fn generate_reset_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn digest_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Rounds derived quantities to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const CONFLICT: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const INVALID_TRANSITION: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            user_id: 7,
            email: "ann@example.com".into(),
            username: "ann".into(),
            password_hash: None,
            google_id: None,
            role_id: role.id(),
            profile_url: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_carries_identity_and_role() {
        let config = Config::default();
        let (token, exp) = generate_token(&user(Role::CharityStaff), false, &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "ann@example.com");
        assert_eq!(claims.role(), Some(Role::CharityStaff));
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn remember_extends_lifetime() {
        let config = Config::default();
        let (_, short) = generate_token(&user(Role::Donor), false, &config).unwrap();
        let (_, long) = generate_token(&user(Role::Donor), true, &config).unwrap();
        let diff = long - short;
        let expected =
            (config.jwt_remember_expiration_secs - config.jwt_expiration_secs) as i64;
        assert!((diff - expected).abs() <= 1);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let config = Config::default();
        let (token, _) = generate_token(&user(Role::Donor), false, &config).unwrap();
        let other = Config {
            jwt_secret: "another-secret".into(),
            ..Config::default()
        };
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn state_token_round_trip() {
        let config = Config::default();
        let state = generate_state_token(&config).unwrap();
        assert!(verify_state_token(&state, &config));
        assert!(!verify_state_token("garbage", &config));
    }

    #[test]
    fn reset_tokens_are_unique_and_digested() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        let digest = digest_token(&a);
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, a);
        assert_eq!(digest, digest_token(&a));
    }

    #[test]
    fn password_hash_verifies() {
        let hashed = hash_password("hunter22", 4).unwrap();
        assert!(verify_password("hunter22", &hashed).unwrap());
        assert!(!verify_password("hunter23", &hashed).unwrap());
    }

    #[test]
    fn round2_fixes_float_noise() {
        assert_eq!(round2(1.2 * 9.0), 10.8);
        assert_eq!(round2(0.3 * 9.0), 2.7);
    }
}
