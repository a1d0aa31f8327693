use std::sync::Arc;

use serde::Serialize;

use super::logistics::{LogisticsRecord, LogisticsScheduler};
use super::notification::NotificationEmitter;
use crate::config::Config;
use crate::database::{DonationChanges, NewDonation, Store, StoreTx};
use crate::error::AppError;
use crate::lookups::{LookupTable, Lookups};
use crate::models::{
    Donation, DonationImage, DonationStatus, NotificationKind, Role, estimate_co2_saved,
    estimate_weight,
};
use crate::utils::round2;

pub const MAX_DONATION_IMAGES: usize = 10;
pub const MILESTONE_THRESHOLD: i64 = 5;

/// Fields a donor submits for a new donation.
#[derive(Debug, Clone, Default)]
pub struct DonationDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub category_id: Option<i32>,
    pub colour_id: Option<i32>,
    pub material_id: Option<i32>,
    pub condition_id: Option<i32>,
    pub gender_id: Option<i32>,
    pub size_id: Option<i32>,
    pub images: Vec<String>,
}

/// A donation with its lookup ids resolved to display names.
#[derive(Debug, Clone, Serialize)]
pub struct DonationView {
    #[serde(flatten)]
    pub donation: Donation,
    pub status_name: Option<String>,
    pub category_name: Option<String>,
    pub size_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonationStats {
    pub total_donations: i64,
    pub total_weight: f64,
    pub total_co2_saved: f64,
}

/// Moves `donation` to `target` and tells its owner. Shared by staff actions
/// and the logistics simulation.
pub(crate) async fn apply_transition(
    tx: &mut dyn StoreTx,
    emitter: &NotificationEmitter,
    donation: &Donation,
    target: DonationStatus,
) -> Result<Donation, AppError> {
    let current = donation.status().ok_or_else(|| {
        AppError::internal(format!(
            "donation {} has unknown status {}",
            donation.donation_id, donation.status_id
        ))
    })?;
    if !current.can_transition_to(target) {
        return Err(AppError::InvalidTransition {
            from: current.name(),
            to: target.name(),
        });
    }

    let updated = tx
        .set_donation_status(donation.donation_id, target.id())
        .await?
        .ok_or_else(|| AppError::not_found("Donation not found"))?;
    emitter
        .emit(
            tx,
            updated.user_id,
            NotificationKind::CharityUpdate,
            format!(
                "Your donation \"{}\" is now: {}",
                updated.title,
                target.name()
            ),
        )
        .await;
    Ok(updated)
}

fn check_lookup(table: &LookupTable, id: Option<i32>, what: &str) -> Result<(), AppError> {
    match id {
        Some(id) if !table.contains(id) => {
            Err(AppError::not_found(format!("{} {} not found", what, id)))
        }
        _ => Ok(()),
    }
}

fn check_quantity(quantity: i32) -> Result<(), AppError> {
    if quantity < 1 {
        return Err(AppError::validation("Quantity must be at least 1"));
    }
    Ok(())
}

pub struct DonationService {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    lookups: Arc<Lookups>,
    emitter: NotificationEmitter,
    logistics: Option<LogisticsScheduler>,
}

impl DonationService {
    pub fn new(
        store: Arc<dyn Store>,
        config: Arc<Config>,
        lookups: Arc<Lookups>,
        emitter: NotificationEmitter,
        logistics: Option<LogisticsScheduler>,
    ) -> Self {
        Self {
            store,
            config,
            lookups,
            emitter,
            logistics,
        }
    }

    pub fn logistics_record(&self, donation_id: i64) -> Result<LogisticsRecord, AppError> {
        let scheduler = self
            .logistics
            .as_ref()
            .ok_or_else(|| AppError::not_found("Logistics simulation is disabled"))?;
        scheduler
            .record(donation_id)
            .ok_or_else(|| AppError::not_found("No logistics task for this donation"))
    }

    pub fn view(&self, donation: Donation) -> DonationView {
        DonationView {
            status_name: self.lookups.status_name(donation.status_id).map(String::from),
            category_name: self
                .lookups
                .categories
                .name_of(donation.category_id)
                .map(String::from),
            size_name: self.lookups.sizes.name_of(donation.size_id).map(String::from),
            donation,
        }
    }

    fn check_lookups(
        &self,
        category_id: Option<i32>,
        colour_id: Option<i32>,
        material_id: Option<i32>,
        condition_id: Option<i32>,
        gender_id: Option<i32>,
        size_id: Option<i32>,
    ) -> Result<(), AppError> {
        check_lookup(&self.lookups.categories, category_id, "Category")?;
        check_lookup(&self.lookups.colours, colour_id, "Colour")?;
        check_lookup(&self.lookups.materials, material_id, "Material")?;
        check_lookup(&self.lookups.conditions, condition_id, "Condition")?;
        check_lookup(&self.lookups.genders, gender_id, "Gender")?;
        check_lookup(&self.lookups.sizes, size_id, "Size")
    }

    pub async fn create(&self, user_id: i64, draft: DonationDraft) -> Result<DonationView, AppError> {
        let title = draft
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::validation("Title is required"))?
            .to_string();
        let category_id = draft
            .category_id
            .ok_or_else(|| AppError::validation("Category is required"))?;
        let size_id = draft
            .size_id
            .ok_or_else(|| AppError::validation("Size is required"))?;
        let quantity = draft.quantity.unwrap_or(1);
        check_quantity(quantity)?;
        if draft.images.len() > MAX_DONATION_IMAGES {
            return Err(AppError::validation(format!(
                "At most {} images per donation",
                MAX_DONATION_IMAGES
            )));
        }
        let images: Vec<String> = draft
            .images
            .iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
        self.check_lookups(
            Some(category_id),
            draft.colour_id,
            draft.material_id,
            draft.condition_id,
            draft.gender_id,
            Some(size_id),
        )?;

        let category = self.lookups.categories.name_of(category_id).unwrap_or_default();
        let weight = round2(estimate_weight(category));
        let co2_saved = estimate_co2_saved(weight);

        let mut tx = self.store.begin().await?;
        let donation = tx
            .insert_donation(NewDonation {
                title,
                description: draft.description.filter(|d| !d.trim().is_empty()),
                quantity,
                weight,
                co2_saved,
                photo_url: images.first().cloned(),
                user_id,
                charity_id: self.config.charity_id,
                status_id: DonationStatus::Submitted.id(),
                category_id,
                colour_id: draft.colour_id,
                material_id: draft.material_id,
                condition_id: draft.condition_id,
                gender_id: draft.gender_id,
                size_id,
            })
            .await?;
        if !images.is_empty() {
            tx.insert_donation_images(donation.donation_id, &images)
                .await?;
        }

        let count = tx.count_donations_for_user(user_id).await?;
        if count == MILESTONE_THRESHOLD {
            self.emitter
                .emit_once(
                    &mut *tx,
                    user_id,
                    NotificationKind::DonationMilestone,
                    format!(
                        "Congratulations! You have made {} donations.",
                        MILESTONE_THRESHOLD
                    ),
                )
                .await;
        }
        tx.commit().await?;

        tracing::info!(
            "Donation {} created by user {}",
            donation.donation_id,
            user_id
        );
        if let Some(logistics) = &self.logistics {
            logistics.schedule(donation.donation_id);
        }
        Ok(self.view(donation))
    }

    pub async fn list_own(&self, user_id: i64) -> Result<Vec<DonationView>, AppError> {
        let mut tx = self.store.begin().await?;
        let donations = tx.list_donations_for_user(user_id).await?;
        Ok(donations.into_iter().map(|d| self.view(d)).collect())
    }

    /// Donors see only their own donations; any other id is refused outright
    /// so ids of other users' donations cannot be probed.
    async fn load_visible(
        &self,
        tx: &mut dyn StoreTx,
        user_id: i64,
        role: Role,
        donation_id: i64,
    ) -> Result<Donation, AppError> {
        let found = tx.find_donation(donation_id).await?;
        if role == Role::Donor {
            return match found {
                Some(donation) if donation.user_id == user_id => Ok(donation),
                _ => Err(AppError::forbidden(
                    "You do not have access to this donation",
                )),
            };
        }
        found.ok_or_else(|| AppError::not_found("Donation not found"))
    }

    pub async fn get(
        &self,
        user_id: i64,
        role: Role,
        donation_id: i64,
    ) -> Result<DonationView, AppError> {
        let mut tx = self.store.begin().await?;
        let donation = self.load_visible(&mut *tx, user_id, role, donation_id).await?;
        Ok(self.view(donation))
    }

    pub async fn images(
        &self,
        user_id: i64,
        role: Role,
        donation_id: i64,
    ) -> Result<Vec<DonationImage>, AppError> {
        let mut tx = self.store.begin().await?;
        self.load_visible(&mut *tx, user_id, role, donation_id).await?;
        Ok(tx.list_donation_images(donation_id).await?)
    }

    pub async fn stats(&self, user_id: i64) -> Result<DonationStats, AppError> {
        let mut tx = self.store.begin().await?;
        let donations = tx.list_donations_for_user(user_id).await?;
        Ok(DonationStats {
            total_donations: donations.len() as i64,
            total_weight: round2(donations.iter().map(|d| d.weight).sum()),
            total_co2_saved: round2(donations.iter().map(|d| d.co2_saved).sum()),
        })
    }

    /// Donations waiting at the charity for a decision.
    pub async fn staff_queue(&self) -> Result<Vec<DonationView>, AppError> {
        let mut tx = self.store.begin().await?;
        let donations = tx
            .list_donations_by_status(DonationStatus::ReceivedAtCharity.id())
            .await?;
        Ok(donations.into_iter().map(|d| self.view(d)).collect())
    }

    /// Edits descriptive fields. Status, weight and CO2 stay as they are.
    pub async fn update(
        &self,
        donation_id: i64,
        mut changes: DonationChanges,
    ) -> Result<DonationView, AppError> {
        if let Some(title) = changes.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(AppError::validation("Title cannot be blank"));
            }
        }
        if let Some(quantity) = changes.quantity {
            check_quantity(quantity)?;
        }
        self.check_lookups(
            changes.category_id,
            changes.colour_id,
            changes.material_id,
            changes.condition_id,
            changes.gender_id,
            changes.size_id,
        )?;

        let mut tx = self.store.begin().await?;
        let donation = tx
            .update_donation(donation_id, &changes)
            .await?
            .ok_or_else(|| AppError::not_found("Donation not found"))?;
        tx.commit().await?;

        tracing::info!("Donation {} updated", donation_id);
        Ok(self.view(donation))
    }

    pub async fn advance_status(
        &self,
        donation_id: i64,
        status_id: i32,
    ) -> Result<DonationView, AppError> {
        let target = DonationStatus::try_from(status_id)
            .map_err(|_| AppError::validation(format!("Unknown status {}", status_id)))?;

        let mut tx = self.store.begin().await?;
        let donation = tx
            .find_donation(donation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Donation not found"))?;
        let updated = apply_transition(&mut *tx, &self.emitter, &donation, target).await?;
        tx.commit().await?;

        tracing::info!(
            "Donation {} moved from {} to {}",
            donation_id,
            donation.status_id,
            status_id
        );
        Ok(self.view(updated))
    }

    pub async fn delete(&self, donation_id: i64) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_donation(donation_id).await? {
            return Err(AppError::not_found("Donation not found"));
        }
        tx.commit().await?;

        if let Some(logistics) = &self.logistics {
            logistics.cancel(donation_id);
        }
        tracing::info!("Donation {} deleted", donation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, NewUser};
    use crate::lookups::seed_rows;
    use crate::services::logistics::{LogisticsPlan, LogisticsState};
    use std::time::Duration;

    struct Fixture {
        store: Arc<dyn Store>,
        service: DonationService,
        donor: i64,
        other: i64,
    }

    async fn insert_user(store: &Arc<dyn Store>, name: &str, role: Role) -> i64 {
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert_user(NewUser {
                email: format!("{}@example.com", name),
                username: name.to_string(),
                password_hash: None,
                google_id: None,
                role_id: role.id(),
                profile_url: None,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user.user_id
    }

    async fn fixture(logistics: Option<LogisticsPlan>) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let lookups = Arc::new(Lookups::from_rows(seed_rows()).unwrap());
        let emitter = NotificationEmitter::new(lookups.clone());
        let scheduler =
            logistics.map(|plan| LogisticsScheduler::new(store.clone(), emitter.clone(), plan));
        let service = DonationService::new(
            store.clone(),
            Arc::new(Config::default()),
            lookups,
            emitter,
            scheduler,
        );
        let donor = insert_user(&store, "donor", Role::Donor).await;
        let other = insert_user(&store, "other", Role::Donor).await;
        Fixture {
            store,
            service,
            donor,
            other,
        }
    }

    fn draft(category_id: i32) -> DonationDraft {
        DonationDraft {
            title: Some("Winter coat".into()),
            category_id: Some(category_id),
            size_id: Some(2),
            ..Default::default()
        }
    }

    async fn milestone_count(store: &Arc<dyn Store>, user_id: i64) -> usize {
        let mut tx = store.begin().await.unwrap();
        tx.list_unread_notifications(user_id)
            .await
            .unwrap()
            .iter()
            .filter(|n| n.message.starts_with("Congratulations"))
            .count()
    }

    #[tokio::test]
    async fn outerwear_weight_and_co2() {
        let f = fixture(None).await;
        let view = f.service.create(f.donor, draft(3)).await.unwrap();
        assert_eq!(view.donation.weight, 1.2);
        assert_eq!(view.donation.co2_saved, 10.8);
        assert_eq!(view.donation.status_id, 1);
        assert_eq!(view.donation.quantity, 1);
        assert_eq!(view.status_name.as_deref(), Some("On its way"));
    }

    #[tokio::test]
    async fn create_validates_input() {
        let f = fixture(None).await;
        let mut missing_title = draft(1);
        missing_title.title = Some("   ".into());
        assert!(matches!(
            f.service.create(f.donor, missing_title).await,
            Err(AppError::Validation(_))
        ));

        let mut missing_size = draft(1);
        missing_size.size_id = None;
        assert!(matches!(
            f.service.create(f.donor, missing_size).await,
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            f.service.create(f.donor, draft(999)).await,
            Err(AppError::NotFound(_))
        ));

        let mut too_many = draft(1);
        too_many.images = (0..11).map(|i| format!("img-{}", i)).collect();
        assert!(matches!(
            f.service.create(f.donor, too_many).await,
            Err(AppError::Validation(_))
        ));

        let mut zero = draft(1);
        zero.quantity = Some(0);
        assert!(matches!(
            f.service.create(f.donor, zero).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn first_image_becomes_photo() {
        let f = fixture(None).await;
        let mut with_images = draft(1);
        with_images.images = vec!["a.jpg".into(), "b.jpg".into()];
        let view = f.service.create(f.donor, with_images).await.unwrap();
        assert_eq!(view.donation.photo_url.as_deref(), Some("a.jpg"));

        let images = f
            .service
            .images(f.donor, Role::Donor, view.donation.donation_id)
            .await
            .unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].image_ref, "b.jpg");
    }

    #[tokio::test]
    async fn milestone_fires_on_fifth_donation_only() {
        let f = fixture(None).await;
        for _ in 0..4 {
            f.service.create(f.donor, draft(1)).await.unwrap();
        }
        assert_eq!(milestone_count(&f.store, f.donor).await, 0);

        f.service.create(f.donor, draft(1)).await.unwrap();
        assert_eq!(milestone_count(&f.store, f.donor).await, 1);

        f.service.create(f.donor, draft(1)).await.unwrap();
        assert_eq!(milestone_count(&f.store, f.donor).await, 1);
    }

    #[tokio::test]
    async fn milestone_is_not_repeated_after_a_delete() {
        let f = fixture(None).await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            let view = f.service.create(f.donor, draft(1)).await.unwrap();
            ids.push(view.donation.donation_id);
        }
        assert_eq!(milestone_count(&f.store, f.donor).await, 1);

        f.service.delete(ids[0]).await.unwrap();
        f.service.create(f.donor, draft(1)).await.unwrap();
        assert_eq!(milestone_count(&f.store, f.donor).await, 1);

        // a read milestone still counts as sent
        {
            let mut tx = f.store.begin().await.unwrap();
            let unread = tx.list_unread_notifications(f.donor).await.unwrap();
            let id = unread
                .iter()
                .find(|n| n.message.starts_with("Congratulations"))
                .unwrap()
                .notification_id;
            assert!(tx.mark_notification_read(f.donor, id).await.unwrap());
            tx.commit().await.unwrap();
        }
        f.service.delete(ids[1]).await.unwrap();
        f.service.create(f.donor, draft(1)).await.unwrap();
        assert_eq!(milestone_count(&f.store, f.donor).await, 0);
    }

    #[tokio::test]
    async fn donors_cannot_read_other_donations() {
        let f = fixture(None).await;
        let view = f.service.create(f.donor, draft(1)).await.unwrap();
        let id = view.donation.donation_id;

        assert!(f.service.get(f.donor, Role::Donor, id).await.is_ok());
        assert!(matches!(
            f.service.get(f.other, Role::Donor, id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.get(f.other, Role::Donor, id + 100).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(f.service.get(f.other, Role::CharityStaff, id).await.is_ok());
        assert!(matches!(
            f.service.get(f.other, Role::CharityStaff, id + 100).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn status_moves_forward_into_queue() {
        let f = fixture(None).await;
        let id = f
            .service
            .create(f.donor, draft(1))
            .await
            .unwrap()
            .donation
            .donation_id;
        assert!(f.service.staff_queue().await.unwrap().is_empty());

        f.service.advance_status(id, 3).await.unwrap();
        let queue = f.service.staff_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].donation.donation_id, id);

        assert!(matches!(
            f.service.advance_status(id, 2).await,
            Err(AppError::InvalidTransition { .. })
        ));
        f.service.advance_status(id, 4).await.unwrap();
        assert!(matches!(
            f.service.advance_status(id, 5).await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            f.service.advance_status(id, 9).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn decision_requires_arrival() {
        let f = fixture(None).await;
        let id = f
            .service
            .create(f.donor, draft(1))
            .await
            .unwrap()
            .donation
            .donation_id;
        assert!(matches!(
            f.service.advance_status(id, 4).await,
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn staff_update_keeps_status_and_weight() {
        let f = fixture(None).await;
        let id = f
            .service
            .create(f.donor, draft(3))
            .await
            .unwrap()
            .donation
            .donation_id;

        let updated = f
            .service
            .update(
                id,
                DonationChanges {
                    title: Some("Parka".into()),
                    category_id: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.donation.title, "Parka");
        assert_eq!(updated.donation.category_id, 1);
        assert_eq!(updated.donation.weight, 1.2);
        assert_eq!(updated.donation.status_id, 1);

        let blank = DonationChanges {
            title: Some(" ".into()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update(id, blank).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            f.service.update(id + 50, DonationChanges::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stats_sum_own_donations() {
        let f = fixture(None).await;
        f.service.create(f.donor, draft(1)).await.unwrap();
        f.service.create(f.donor, draft(3)).await.unwrap();
        f.service.create(f.other, draft(3)).await.unwrap();

        let stats = f.service.stats(f.donor).await.unwrap();
        assert_eq!(stats.total_donations, 2);
        assert_eq!(stats.total_weight, 1.5);
        assert_eq!(stats.total_co2_saved, 13.5);
    }

    #[tokio::test]
    async fn delete_cancels_logistics() {
        let f = fixture(Some(LogisticsPlan {
            in_transit_after: Duration::from_secs(60),
            received_after: Duration::from_secs(60),
            retention: Duration::from_secs(60),
        }))
        .await;
        let id = f
            .service
            .create(f.donor, draft(1))
            .await
            .unwrap()
            .donation
            .donation_id;
        assert_eq!(
            f.service.logistics_record(id).unwrap().state,
            LogisticsState::Scheduled
        );

        f.service.delete(id).await.unwrap();
        assert_eq!(
            f.service.logistics_record(id).unwrap().state,
            LogisticsState::Cancelled
        );
        assert!(matches!(
            f.service.logistics_record(id + 1),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service.delete(id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
