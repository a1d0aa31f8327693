use serde::Deserialize;

use crate::models::Role;
use crate::services::user::{AccountChanges, NewAccount, ProfileChanges};

#[derive(Debug, Deserialize)]
pub struct UpdateUserInfoRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub profile_url: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

impl From<UpdateUserInfoRequest> for ProfileChanges {
    fn from(req: UpdateUserInfoRequest) -> Self {
        ProfileChanges {
            username: req.username,
            email: req.email,
            profile_url: req.profile_url,
            current_password: req.current_password,
            new_password: req.new_password,
        }
    }
}

fn default_role() -> i32 {
    Role::Donor.id()
}

#[derive(Debug, Deserialize)]
pub struct CreateUserEntry {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_role")]
    pub role_id: i32,
    pub profile_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUsersRequest {
    pub users: Vec<CreateUserEntry>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserEntry {
    pub user_id: i64,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<i32>,
    pub profile_url: Option<String>,
}

impl From<UpdateUserEntry> for AccountChanges {
    fn from(entry: UpdateUserEntry) -> Self {
        AccountChanges {
            user_id: entry.user_id,
            email: entry.email,
            username: entry.username,
            password: entry.password,
            role_id: entry.role_id,
            profile_url: entry.profile_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUsersRequest {
    pub users: Vec<UpdateUserEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUsersRequest {
    pub user_ids: Vec<i64>,
}

/// Accounts the admin create endpoint will insert.
pub fn new_accounts(entries: Vec<CreateUserEntry>) -> Result<Vec<NewAccount>, String> {
    entries
        .into_iter()
        .map(|entry| match (entry.email, entry.username, entry.password) {
            (Some(email), Some(username), Some(password)) => Ok(NewAccount {
                email,
                username,
                password,
                role_id: entry.role_id,
                profile_url: entry.profile_url,
            }),
            _ => Err("Username, email and password are required".to_string()),
        })
        .collect()
}
