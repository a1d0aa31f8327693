//! Storage seam: every component receives an `Arc<dyn Store>` and performs its
//! reads and writes inside a `StoreTx`. Dropping a transaction without
//! calling `commit` rolls it back.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::models::{Donation, DonationImage, LookupEntry, Notification, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Carries the name of the violated constraint, e.g. `users_email_key`.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    /// Foreign-key or check constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub role_id: i32,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub title: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub weight: f64,
    pub co2_saved: f64,
    pub photo_url: Option<String>,
    pub user_id: i64,
    pub charity_id: i32,
    pub status_id: i32,
    pub category_id: i32,
    pub colour_id: Option<i32>,
    pub material_id: Option<i32>,
    pub condition_id: Option<i32>,
    pub gender_id: Option<i32>,
    pub size_id: i32,
}

/// Descriptive fields staff may edit; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct DonationChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub category_id: Option<i32>,
    pub colour_id: Option<i32>,
    pub material_id: Option<i32>,
    pub condition_id: Option<i32>,
    pub gender_id: Option<i32>,
    pub size_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub notification_type_id: i32,
    pub message: String,
}

/// Raw contents of the reference tables.
#[derive(Debug, Clone, Default)]
pub struct LookupRows {
    pub roles: Vec<LookupEntry>,
    pub statuses: Vec<LookupEntry>,
    pub categories: Vec<LookupEntry>,
    pub colours: Vec<LookupEntry>,
    pub materials: Vec<LookupEntry>,
    pub conditions: Vec<LookupEntry>,
    pub genders: Vec<LookupEntry>,
    pub sizes: Vec<LookupEntry>,
    pub notification_types: Vec<LookupEntry>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn load_lookups(&mut self) -> StoreResult<LookupRows>;

    async fn find_user(&mut self, user_id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_google_id(&mut self, google_id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_reset_token(&mut self, token_hash: &str) -> StoreResult<Option<User>>;
    async fn list_users(&mut self) -> StoreResult<Vec<User>>;
    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User>;
    /// Writes every mutable column of `user` back to its row.
    async fn save_user(&mut self, user: &User) -> StoreResult<User>;
    /// Removes the users together with their donations and notifications.
    async fn delete_users(&mut self, user_ids: &[i64]) -> StoreResult<u64>;

    async fn insert_donation(&mut self, donation: NewDonation) -> StoreResult<Donation>;
    async fn insert_donation_images(
        &mut self,
        donation_id: i64,
        image_refs: &[String],
    ) -> StoreResult<Vec<DonationImage>>;
    async fn list_donation_images(&mut self, donation_id: i64) -> StoreResult<Vec<DonationImage>>;
    async fn find_donation(&mut self, donation_id: i64) -> StoreResult<Option<Donation>>;
    /// Newest first.
    async fn list_donations_for_user(&mut self, user_id: i64) -> StoreResult<Vec<Donation>>;
    async fn list_donations_by_status(&mut self, status_id: i32) -> StoreResult<Vec<Donation>>;
    async fn count_donations_for_user(&mut self, user_id: i64) -> StoreResult<i64>;
    async fn update_donation(
        &mut self,
        donation_id: i64,
        changes: &DonationChanges,
    ) -> StoreResult<Option<Donation>>;
    async fn set_donation_status(
        &mut self,
        donation_id: i64,
        status_id: i32,
    ) -> StoreResult<Option<Donation>>;
    async fn delete_donation(&mut self, donation_id: i64) -> StoreResult<bool>;

    /// Must not poison the surrounding transaction when it fails.
    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> StoreResult<Notification>;
    /// Whether the user has ever received a notification of this type, read or not.
    async fn has_notification(
        &mut self,
        user_id: i64,
        notification_type_id: i32,
    ) -> StoreResult<bool>;
    /// Unread only, newest first.
    async fn list_unread_notifications(&mut self, user_id: i64) -> StoreResult<Vec<Notification>>;
    async fn mark_notification_read(
        &mut self,
        user_id: i64,
        notification_id: i64,
    ) -> StoreResult<bool>;
}
