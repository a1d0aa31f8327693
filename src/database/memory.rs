use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    DonationChanges, LookupRows, NewDonation, NewNotification, NewUser, Store, StoreError,
    StoreResult, StoreTx,
};
use crate::lookups::seed_rows;
use crate::models::{Donation, DonationImage, Notification, User};

#[derive(Debug, Clone, Default)]
struct MemoryData {
    lookups: LookupRows,
    users: BTreeMap<i64, User>,
    donations: BTreeMap<i64, Donation>,
    images: Vec<DonationImage>,
    notifications: BTreeMap<i64, Notification>,
    next_user_id: i64,
    next_donation_id: i64,
    next_image_id: i64,
    next_notification_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Process-local store used for development runs and tests.
///
/// Transactions hold an exclusive lock and work on a copy of the data, which
/// is published on `commit` and discarded on drop.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store seeded with the standard reference data.
    pub fn new() -> Self {
        Self::with_lookups(seed_rows())
    }

    pub fn with_lookups(lookups: LookupRows) -> Self {
        let data = MemoryData {
            lookups,
            ..MemoryData::default()
        };
        Self {
            data: Arc::new(Mutex::new(data)),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.data).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryData>,
    working: MemoryData,
}

impl MemoryTx {
    fn check_user_unique(&self, user: &User) -> StoreResult<()> {
        for other in self.working.users.values() {
            if other.user_id == user.user_id {
                continue;
            }
            if other.email == user.email {
                return Err(StoreError::UniqueViolation("users_email_key".into()));
            }
            if other.username == user.username {
                return Err(StoreError::UniqueViolation("users_username_key".into()));
            }
            if user.google_id.is_some() && other.google_id == user.google_id {
                return Err(StoreError::UniqueViolation("users_google_id_key".into()));
            }
        }
        Ok(())
    }

    fn find_user_by<F>(&self, predicate: F) -> Option<User>
    where
        F: Fn(&User) -> bool,
    {
        self.working.users.values().find(|u| predicate(u)).cloned()
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn load_lookups(&mut self) -> StoreResult<LookupRows> {
        Ok(self.working.lookups.clone())
    }

    async fn find_user(&mut self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.find_user_by(|u| u.email == email))
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.find_user_by(|u| u.username == username))
    }

    async fn find_user_by_google_id(&mut self, google_id: &str) -> StoreResult<Option<User>> {
        Ok(self.find_user_by(|u| u.google_id.as_deref() == Some(google_id)))
    }

    async fn find_user_by_reset_token(&mut self, token_hash: &str) -> StoreResult<Option<User>> {
        Ok(self.find_user_by(|u| u.reset_token_hash.as_deref() == Some(token_hash)))
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        Ok(self.working.users.values().cloned().collect())
    }

    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        if !self.working.lookups.roles.iter().any(|r| r.id == user.role_id) {
            return Err(StoreError::Constraint(format!("unknown role {}", user.role_id)));
        }
        let candidate = User {
            user_id: 0,
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            google_id: user.google_id,
            role_id: user.role_id,
            profile_url: user.profile_url,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: Utc::now(),
        };
        self.check_user_unique(&candidate)?;
        let user = User {
            user_id: next_id(&mut self.working.next_user_id),
            ..candidate
        };
        self.working.users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn save_user(&mut self, user: &User) -> StoreResult<User> {
        if !self.working.users.contains_key(&user.user_id) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        self.check_user_unique(user)?;
        self.working.users.insert(user.user_id, user.clone());
        Ok(user.clone())
    }

    async fn delete_users(&mut self, user_ids: &[i64]) -> StoreResult<u64> {
        let data = &mut self.working;
        let mut removed = 0;
        for user_id in user_ids {
            if data.users.remove(user_id).is_some() {
                removed += 1;
            }
        }
        data.donations.retain(|_, d| !user_ids.contains(&d.user_id));
        let donations = &data.donations;
        data.images.retain(|i| donations.contains_key(&i.donation_id));
        data.notifications
            .retain(|_, n| !user_ids.contains(&n.user_id));
        Ok(removed)
    }

    async fn insert_donation(&mut self, donation: NewDonation) -> StoreResult<Donation> {
        if !self.working.users.contains_key(&donation.user_id) {
            return Err(StoreError::Constraint(format!(
                "unknown user {}",
                donation.user_id
            )));
        }
        if donation.quantity <= 0 {
            return Err(StoreError::Constraint("quantity must be positive".into()));
        }
        let now = Utc::now();
        let row = Donation {
            donation_id: next_id(&mut self.working.next_donation_id),
            title: donation.title,
            description: donation.description,
            quantity: donation.quantity,
            weight: donation.weight,
            co2_saved: donation.co2_saved,
            photo_url: donation.photo_url,
            user_id: donation.user_id,
            charity_id: donation.charity_id,
            status_id: donation.status_id,
            category_id: donation.category_id,
            colour_id: donation.colour_id,
            material_id: donation.material_id,
            condition_id: donation.condition_id,
            gender_id: donation.gender_id,
            size_id: donation.size_id,
            created_at: now,
            updated_at: now,
        };
        self.working.donations.insert(row.donation_id, row.clone());
        Ok(row)
    }

    async fn insert_donation_images(
        &mut self,
        donation_id: i64,
        image_refs: &[String],
    ) -> StoreResult<Vec<DonationImage>> {
        if !self.working.donations.contains_key(&donation_id) {
            return Err(StoreError::Constraint(format!(
                "unknown donation {}",
                donation_id
            )));
        }
        let mut inserted = Vec::with_capacity(image_refs.len());
        for (position, image_ref) in image_refs.iter().enumerate() {
            let image = DonationImage {
                image_id: next_id(&mut self.working.next_image_id),
                donation_id,
                image_ref: image_ref.clone(),
                position: position as i32,
            };
            self.working.images.push(image.clone());
            inserted.push(image);
        }
        Ok(inserted)
    }

    async fn list_donation_images(&mut self, donation_id: i64) -> StoreResult<Vec<DonationImage>> {
        let mut images: Vec<DonationImage> = self
            .working
            .images
            .iter()
            .filter(|i| i.donation_id == donation_id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.position);
        Ok(images)
    }

    async fn find_donation(&mut self, donation_id: i64) -> StoreResult<Option<Donation>> {
        Ok(self.working.donations.get(&donation_id).cloned())
    }

    async fn list_donations_for_user(&mut self, user_id: i64) -> StoreResult<Vec<Donation>> {
        let mut donations: Vec<Donation> = self
            .working
            .donations
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        donations.sort_by(|a, b| {
            (b.created_at, b.donation_id).cmp(&(a.created_at, a.donation_id))
        });
        Ok(donations)
    }

    async fn list_donations_by_status(&mut self, status_id: i32) -> StoreResult<Vec<Donation>> {
        Ok(self
            .working
            .donations
            .values()
            .filter(|d| d.status_id == status_id)
            .cloned()
            .collect())
    }

    async fn count_donations_for_user(&mut self, user_id: i64) -> StoreResult<i64> {
        Ok(self
            .working
            .donations
            .values()
            .filter(|d| d.user_id == user_id)
            .count() as i64)
    }

    async fn update_donation(
        &mut self,
        donation_id: i64,
        changes: &DonationChanges,
    ) -> StoreResult<Option<Donation>> {
        let Some(donation) = self.working.donations.get_mut(&donation_id) else {
            return Ok(None);
        };
        if let Some(title) = &changes.title {
            donation.title = title.clone();
        }
        if let Some(description) = &changes.description {
            donation.description = Some(description.clone());
        }
        if let Some(quantity) = changes.quantity {
            donation.quantity = quantity;
        }
        if let Some(category_id) = changes.category_id {
            donation.category_id = category_id;
        }
        if let Some(size_id) = changes.size_id {
            donation.size_id = size_id;
        }
        donation.colour_id = changes.colour_id.or(donation.colour_id);
        donation.material_id = changes.material_id.or(donation.material_id);
        donation.condition_id = changes.condition_id.or(donation.condition_id);
        donation.gender_id = changes.gender_id.or(donation.gender_id);
        donation.updated_at = Utc::now();
        Ok(Some(donation.clone()))
    }

    async fn set_donation_status(
        &mut self,
        donation_id: i64,
        status_id: i32,
    ) -> StoreResult<Option<Donation>> {
        let Some(donation) = self.working.donations.get_mut(&donation_id) else {
            return Ok(None);
        };
        donation.status_id = status_id;
        donation.updated_at = Utc::now();
        Ok(Some(donation.clone()))
    }

    async fn delete_donation(&mut self, donation_id: i64) -> StoreResult<bool> {
        let removed = self.working.donations.remove(&donation_id).is_some();
        self.working.images.retain(|i| i.donation_id != donation_id);
        Ok(removed)
    }

    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let type_known = self
            .working
            .lookups
            .notification_types
            .iter()
            .any(|t| t.id == notification.notification_type_id);
        if !type_known || !self.working.users.contains_key(&notification.user_id) {
            return Err(StoreError::Constraint(
                "notification references a missing user or type".into(),
            ));
        }
        let row = Notification {
            notification_id: next_id(&mut self.working.next_notification_id),
            user_id: notification.user_id,
            notification_type_id: notification.notification_type_id,
            message: notification.message,
            is_read: false,
            created_at: Utc::now(),
        };
        self.working
            .notifications
            .insert(row.notification_id, row.clone());
        Ok(row)
    }

    async fn has_notification(
        &mut self,
        user_id: i64,
        notification_type_id: i32,
    ) -> StoreResult<bool> {
        Ok(self
            .working
            .notifications
            .values()
            .any(|n| n.user_id == user_id && n.notification_type_id == notification_type_id))
    }

    async fn list_unread_notifications(&mut self, user_id: i64) -> StoreResult<Vec<Notification>> {
        let mut unread: Vec<Notification> = self
            .working
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .cloned()
            .collect();
        unread.sort_by(|a, b| {
            (b.created_at, b.notification_id).cmp(&(a.created_at, a.notification_id))
        });
        Ok(unread)
    }

    async fn mark_notification_read(
        &mut self,
        user_id: i64,
        notification_id: i64,
    ) -> StoreResult<bool> {
        match self.working.notifications.get_mut(&notification_id) {
            Some(n) if n.user_id == user_id => {
                n.is_read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.into(),
            username: username.into(),
            password_hash: None,
            google_id: None,
            role_id: Role::Donor.id(),
            profile_url: None,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_user(new_user("a@example.com", "a")).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(new_user("a@example.com", "a")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_user_by_email("a@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.user_id), Some(user.user_id));
    }

    #[tokio::test]
    async fn unique_columns_are_enforced() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(new_user("a@example.com", "a")).await.unwrap();

        let email = tx.insert_user(new_user("a@example.com", "b")).await;
        assert!(matches!(email, Err(StoreError::UniqueViolation(ref c)) if c == "users_email_key"));

        let username = tx.insert_user(new_user("b@example.com", "a")).await;
        assert!(
            matches!(username, Err(StoreError::UniqueViolation(ref c)) if c == "users_username_key")
        );
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(new_user("a@example.com", "a")).await.unwrap();
        let donation = tx
            .insert_donation(NewDonation {
                title: "Coat".into(),
                description: None,
                quantity: 1,
                weight: 1.2,
                co2_saved: 10.8,
                photo_url: None,
                user_id: user.user_id,
                charity_id: 1,
                status_id: 1,
                category_id: 3,
                colour_id: None,
                material_id: None,
                condition_id: None,
                gender_id: None,
                size_id: 1,
            })
            .await
            .unwrap();
        tx.insert_donation_images(donation.donation_id, &["a.png".to_string()])
            .await
            .unwrap();

        assert_eq!(tx.delete_users(&[user.user_id]).await.unwrap(), 1);
        assert!(tx.find_donation(donation.donation_id).await.unwrap().is_none());
        assert!(tx
            .list_donation_images(donation.donation_id)
            .await
            .unwrap()
            .is_empty());
    }
}
