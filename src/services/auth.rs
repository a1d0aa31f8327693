use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::google::GoogleProfile;
use super::mailer::{MailMessage, Mailer};
use super::notification::NotificationEmitter;
use crate::config::Config;
use crate::database::{NewUser, Store, StoreTx};
use crate::error::AppError;
use crate::models::{NotificationKind, Role, User};
use crate::utils::{digest_token, generate_reset_token, generate_token, hash_password, verify_password};

const MAX_USERNAME_SUFFIX: u32 = 10_000;

/// A freshly issued session token and the account it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::validation("Invalid email address"))
    }
}

pub fn validate_username(username: &str) -> Result<(), AppError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(AppError::validation(
            "Username must be between 3 and 32 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(AppError::validation(
            "Username may only contain letters, digits, '_' and '.'",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    // bcrypt only looks at the first 72 bytes
    if password.len() < 6 || password.len() > 72 {
        return Err(AppError::validation(
            "Password must be between 6 and 72 characters",
        ));
    }
    Ok(())
}

/// Username seed derived from the email's local part.
pub fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default().to_lowercase();
    let cleaned: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .take(24)
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

/// First free name among `base`, `base1`, `base2`, ...
pub async fn unique_username(tx: &mut dyn StoreTx, base: &str) -> Result<String, AppError> {
    if tx.find_user_by_username(base).await?.is_none() {
        return Ok(base.to_string());
    }
    for counter in 1..=MAX_USERNAME_SUFFIX {
        let candidate = format!("{}{}", base, counter);
        if tx.find_user_by_username(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Ok(format!("{}_{}", base, &Uuid::new_v4().simple().to_string()[..8]))
}

pub struct AuthService {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    emitter: NotificationEmitter,
    mailer: Arc<dyn Mailer>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        config: Arc<Config>,
        emitter: NotificationEmitter,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            config,
            emitter,
            mailer,
        }
    }

    pub fn issue(&self, user: User, remember: bool) -> Result<Session, AppError> {
        let (token, expires_at) = generate_token(&user, remember, &self.config)?;
        Ok(Session {
            token,
            expires_at,
            user,
        })
    }

    /// Creates a donor account. Email and username collisions are reported separately.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let email = normalize_email(email);
        let username = username.trim();
        validate_email(&email)?;
        validate_username(username)?;
        validate_password(password)?;

        let mut tx = self.store.begin().await?;
        if tx.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("Email already registered"));
        }
        if tx.find_user_by_username(username).await?.is_some() {
            return Err(AppError::conflict("Username already taken"));
        }

        let password_hash = hash_password(password, self.config.bcrypt_cost)?;
        let user = tx
            .insert_user(NewUser {
                email,
                username: username.to_string(),
                password_hash: Some(password_hash),
                google_id: None,
                role_id: Role::Donor.id(),
                profile_url: None,
            })
            .await?;
        tx.commit().await?;

        tracing::info!("Registered user {} ({})", user.user_id, user.username);
        Ok(user)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<Session, AppError> {
        let email = normalize_email(email);
        let user = {
            let mut tx = self.store.begin().await?;
            tx.find_user_by_email(&email).await?
        };
        let Some(user) = user else {
            return Err(AppError::InvalidCredentials);
        };
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(AppError::ExternalAuthRequired);
        };
        if !verify_password(password, hash)? {
            tracing::debug!("Failed password login for user {}", user.user_id);
            return Err(AppError::InvalidCredentials);
        }

        self.issue(user, remember)
    }

    /// Signs in with a provider identity, linking or creating the account on first sight.
    pub async fn external_login(&self, profile: &GoogleProfile) -> Result<Session, AppError> {
        let mut tx = self.store.begin().await?;

        let user = match tx.find_user_by_google_id(&profile.sub).await? {
            Some(user) => user,
            None => {
                if !profile.email_verified {
                    return Err(AppError::InvalidCredentials);
                }
                let email = normalize_email(&profile.email);
                match tx.find_user_by_email(&email).await? {
                    Some(mut existing) => {
                        if existing.google_id.is_some() {
                            return Err(AppError::conflict(
                                "Email is linked to a different Google account",
                            ));
                        }
                        existing.google_id = Some(profile.sub.clone());
                        let linked = tx.save_user(&existing).await?;
                        self.emitter
                            .emit(
                                &mut *tx,
                                linked.user_id,
                                NotificationKind::AccountSecurity,
                                "Google sign-in was linked to your account",
                            )
                            .await;
                        tracing::info!("Linked Google identity to user {}", linked.user_id);
                        linked
                    }
                    None => {
                        let username = unique_username(&mut *tx, &username_base(&email)).await?;
                        let created = tx
                            .insert_user(NewUser {
                                email,
                                username,
                                password_hash: None,
                                google_id: Some(profile.sub.clone()),
                                role_id: Role::Donor.id(),
                                profile_url: profile.picture.clone(),
                            })
                            .await?;
                        tracing::info!(
                            "Created user {} from Google sign-in",
                            created.user_id
                        );
                        created
                    }
                }
            }
        };
        tx.commit().await?;

        self.issue(user, false)
    }

    /// Stores a digest of a fresh reset token and mails the link. Unknown
    /// emails succeed silently.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        let mut tx = self.store.begin().await?;
        let Some(mut user) = tx.find_user_by_email(&email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_reset_token();
        let expires_at =
            Utc::now() + Duration::seconds(self.config.reset_token_expiration_secs as i64);
        user.reset_token_hash = Some(digest_token(&token));
        user.reset_token_expires_at = Some(expires_at);
        tx.save_user(&user).await?;
        tx.commit().await?;

        let link = format!(
            "{}/reset-password?token={}",
            self.config.frontend_url, token
        );
        let message = MailMessage {
            from: self.config.mail_from.clone(),
            to: user.email.clone(),
            subject: "Reset your password".to_string(),
            body: format!(
                "Hello {},\n\nUse the link below to choose a new password. It expires in {} minutes.\n\n{}\n",
                user.username,
                self.config.reset_token_expiration_secs / 60,
                link
            ),
        };
        if let Err(e) = self.mailer.send(message).await {
            tracing::warn!("Failed to send reset email to user {}: {}", user.user_id, e);
        }
        Ok(())
    }

    /// Consumes a reset token; a token works once and only before it expires.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        validate_password(new_password)?;
        let invalid = || AppError::validation("Invalid or expired reset token");
        if token.trim().is_empty() {
            return Err(invalid());
        }
        let password_hash = hash_password(new_password, self.config.bcrypt_cost)?;

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .find_user_by_reset_token(&digest_token(token.trim()))
            .await?
            .ok_or_else(invalid)?;
        match user.reset_token_expires_at {
            Some(expires_at) if expires_at > Utc::now() => {}
            _ => return Err(invalid()),
        }

        user.password_hash = Some(password_hash);
        user.reset_token_hash = None;
        user.reset_token_expires_at = None;
        let user = tx.save_user(&user).await?;
        self.emitter
            .emit(
                &mut *tx,
                user.user_id,
                NotificationKind::AccountSecurity,
                "Your password was reset",
            )
            .await;
        tx.commit().await?;

        tracing::info!("Password reset for user {}", user.user_id);
        Ok(())
    }
}
