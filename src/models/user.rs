use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Role {
    Donor = 1,
    CharityStaff = 2,
    Administrator = 3,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Donor, Role::CharityStaff, Role::Administrator];

    pub fn id(self) -> i32 {
        self as i32
    }

    /// Name seeded in the `roles` table.
    pub fn name(self) -> &'static str {
        match self {
            Role::Donor => "Donor",
            Role::CharityStaff => "Charity Staff",
            Role::Administrator => "Administrator",
        }
    }
}

impl TryFrom<i32> for Role {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Role::Donor),
            2 => Ok(Role::CharityStaff),
            3 => Ok(Role::Administrator),
            other => Err(format!("unknown role id {}", other)),
        }
    }
}

impl From<Role> for i32 {
    fn from(role: Role) -> Self {
        role.id()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub google_id: Option<String>,
    pub role_id: i32,
    pub profile_url: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        Role::try_from(self.role_id).ok()
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}
