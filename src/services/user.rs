use std::collections::BTreeSet;
use std::sync::Arc;

use super::auth::{normalize_email, validate_email, validate_password, validate_username};
use super::notification::NotificationEmitter;
use crate::config::Config;
use crate::database::{NewUser, Store, StoreTx};
use crate::error::AppError;
use crate::models::{NotificationKind, Role, User};
use crate::utils::{hash_password, verify_password};

/// Self-service profile edit. `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub profile_url: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role_id: i32,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub user_id: i64,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<i32>,
    pub profile_url: Option<String>,
}

fn parse_role(role_id: i32) -> Result<Role, AppError> {
    Role::try_from(role_id).map_err(|_| AppError::validation(format!("Unknown role {}", role_id)))
}

/// Applies a new email after checking that no other account holds it.
async fn change_email(
    tx: &mut dyn StoreTx,
    user: &mut User,
    email: &str,
) -> Result<bool, AppError> {
    let email = normalize_email(email);
    validate_email(&email)?;
    if email == user.email {
        return Ok(false);
    }
    if let Some(holder) = tx.find_user_by_email(&email).await? {
        if holder.user_id != user.user_id {
            return Err(AppError::conflict("Email already registered"));
        }
    }
    user.email = email;
    Ok(true)
}

async fn change_username(
    tx: &mut dyn StoreTx,
    user: &mut User,
    username: &str,
) -> Result<bool, AppError> {
    let username = username.trim();
    validate_username(username)?;
    if username == user.username {
        return Ok(false);
    }
    if let Some(holder) = tx.find_user_by_username(username).await? {
        if holder.user_id != user.user_id {
            return Err(AppError::conflict("Username already taken"));
        }
    }
    user.username = username.to_string();
    Ok(true)
}

fn change_profile_url(user: &mut User, url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || user.profile_url.as_deref() == Some(url) {
        return false;
    }
    user.profile_url = Some(url.to_string());
    true
}

/// Blank strings count as "not supplied".
fn supplied(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

pub struct UserService {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    emitter: NotificationEmitter,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>, emitter: NotificationEmitter) -> Self {
        Self {
            store,
            config,
            emitter,
        }
    }

    pub async fn profile(&self, user_id: i64) -> Result<User, AppError> {
        let mut tx = self.store.begin().await?;
        tx.find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        changes: ProfileChanges,
    ) -> Result<User, AppError> {
        let new_hash = match supplied(&changes.new_password) {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password, self.config.bcrypt_cost)?)
            }
            None => None,
        };

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let mut security = Vec::new();
        let mut profile = Vec::new();

        if let Some(email) = supplied(&changes.email) {
            if change_email(&mut *tx, &mut user, email).await? {
                security.push("Your email address was changed".to_string());
            }
        }
        if let Some(username) = supplied(&changes.username) {
            if change_username(&mut *tx, &mut user, username).await? {
                profile.push(format!("Your username was changed to {}", user.username));
            }
        }
        if let Some(url) = changes.profile_url.as_deref() {
            if change_profile_url(&mut user, url) {
                profile.push("Your profile image was updated".to_string());
            }
        }
        if let Some(hash) = new_hash {
            if let Some(existing) = user.password_hash.as_deref() {
                let current = changes.current_password.as_deref().unwrap_or_default();
                if current.is_empty() || !verify_password(current, existing)? {
                    return Err(AppError::validation("Current password is incorrect"));
                }
            }
            user.password_hash = Some(hash);
            security.push("Your password was changed".to_string());
        }

        if security.is_empty() && profile.is_empty() {
            return Ok(user);
        }

        let user = tx.save_user(&user).await?;
        for message in security {
            self.emitter
                .emit(&mut *tx, user_id, NotificationKind::AccountSecurity, message)
                .await;
        }
        match profile.len() {
            0 => {}
            1 => {
                let message = profile.remove(0);
                self.emitter
                    .emit(&mut *tx, user_id, NotificationKind::ProfileUpdate, message)
                    .await;
            }
            _ => {
                self.emitter
                    .emit(
                        &mut *tx,
                        user_id,
                        NotificationKind::ProfileUpdate,
                        "Your profile was updated",
                    )
                    .await;
            }
        }
        tx.commit().await?;

        tracing::info!("User {} updated their profile", user_id);
        Ok(user)
    }

    pub async fn delete_own(&self, user_id: i64) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        if tx.delete_users(&[user_id]).await? == 0 {
            return Err(AppError::not_found("User not found"));
        }
        tx.commit().await?;
        tracing::info!("User {} deleted their account", user_id);
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_users().await?)
    }

    /// Creates every account or none.
    pub async fn create_users(&self, accounts: Vec<NewAccount>) -> Result<Vec<User>, AppError> {
        if accounts.is_empty() {
            return Err(AppError::validation("No users supplied"));
        }

        let mut prepared = Vec::with_capacity(accounts.len());
        for account in accounts {
            let email = normalize_email(&account.email);
            let username = account.username.trim().to_string();
            validate_email(&email)?;
            validate_username(&username)?;
            validate_password(&account.password)?;
            let role = parse_role(account.role_id)?;
            prepared.push(NewUser {
                email,
                username,
                password_hash: Some(hash_password(&account.password, self.config.bcrypt_cost)?),
                google_id: None,
                role_id: role.id(),
                profile_url: supplied(&account.profile_url).map(|u| u.trim().to_string()),
            });
        }

        let mut tx = self.store.begin().await?;
        let mut created = Vec::with_capacity(prepared.len());
        for new_user in prepared {
            if tx.find_user_by_email(&new_user.email).await?.is_some() {
                return Err(AppError::conflict(format!(
                    "Email already registered: {}",
                    new_user.email
                )));
            }
            if tx.find_user_by_username(&new_user.username).await?.is_some() {
                return Err(AppError::conflict(format!(
                    "Username already taken: {}",
                    new_user.username
                )));
            }
            created.push(tx.insert_user(new_user).await?);
        }
        tx.commit().await?;

        tracing::info!("Created {} users", created.len());
        Ok(created)
    }

    /// Applies every change or none.
    pub async fn update_users(&self, changes: Vec<AccountChanges>) -> Result<Vec<User>, AppError> {
        if changes.is_empty() {
            return Err(AppError::validation("No users supplied"));
        }

        // bcrypt runs before the transaction opens
        let mut prepared = Vec::with_capacity(changes.len());
        for change in changes {
            let password_hash = match supplied(&change.password) {
                Some(password) => {
                    validate_password(password)?;
                    Some(hash_password(password, self.config.bcrypt_cost)?)
                }
                None => None,
            };
            prepared.push((change, password_hash));
        }

        let mut tx = self.store.begin().await?;
        let mut updated = Vec::with_capacity(prepared.len());
        for (change, password_hash) in prepared {
            let mut user = tx
                .find_user(change.user_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("User {} not found", change.user_id)))?;
            let mut security = Vec::new();

            if let Some(email) = supplied(&change.email) {
                if change_email(&mut *tx, &mut user, email).await? {
                    security.push("Your email address was changed by an administrator");
                }
            }
            if let Some(username) = supplied(&change.username) {
                change_username(&mut *tx, &mut user, username).await?;
            }
            if let Some(url) = change.profile_url.as_deref() {
                change_profile_url(&mut user, url);
            }
            if let Some(hash) = password_hash {
                // only password accounts may be given a new one here
                if !user.has_password() {
                    return Err(AppError::forbidden(
                        "Cannot set a password on an account that signs in with Google",
                    ));
                }
                user.password_hash = Some(hash);
                security.push("Your password was changed by an administrator");
            }
            let role_changed = match change.role_id {
                Some(role_id) => {
                    let role = parse_role(role_id)?;
                    let changed = role.id() != user.role_id;
                    user.role_id = role.id();
                    changed.then_some(role)
                }
                None => None,
            };

            let saved = tx.save_user(&user).await?;
            for message in security {
                self.emitter
                    .emit(&mut *tx, saved.user_id, NotificationKind::AccountSecurity, message)
                    .await;
            }
            if let Some(role) = role_changed {
                self.emitter
                    .emit(
                        &mut *tx,
                        saved.user_id,
                        NotificationKind::SystemAlert,
                        format!("Your role is now {}", role.name()),
                    )
                    .await;
            }
            updated.push(saved);
        }
        tx.commit().await?;

        tracing::info!("Updated {} users", updated.len());
        Ok(updated)
    }

    /// Deletes every listed user or none; an unknown id aborts the batch.
    pub async fn delete_users(&self, user_ids: Vec<i64>) -> Result<u64, AppError> {
        let ids: Vec<i64> = user_ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Err(AppError::validation("No users supplied"));
        }

        let mut tx = self.store.begin().await?;
        let deleted = tx.delete_users(&ids).await?;
        if deleted != ids.len() as u64 {
            return Err(AppError::not_found("One or more users were not found"));
        }
        tx.commit().await?;

        tracing::info!("Deleted {} users", deleted);
        Ok(deleted)
    }
}
