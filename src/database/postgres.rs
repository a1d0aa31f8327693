use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgPool, Postgres, Transaction};

use super::{
    DonationChanges, LookupRows, NewDonation, NewNotification, NewUser, Store, StoreError,
    StoreResult, StoreTx,
};
use crate::models::{Donation, DonationImage, LookupEntry, Notification, User};

const USER_COLUMNS: &str = "user_id, email, username, password_hash, google_id, role_id, \
     profile_url, reset_token_hash, reset_token_expires_at, created_at";

const DONATION_COLUMNS: &str = "donation_id, title, description, quantity, weight, co2_saved, \
     photo_url, user_id, charity_id, status_id, category_id, colour_id, material_id, \
     condition_id, gender_id, size_id, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str =
    "notification_id, user_id, notification_type_id, message, is_read, created_at";

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or("unique").to_string();
            return StoreError::UniqueViolation(constraint);
        }
    }
    StoreError::Database(err)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'donation_backend';")
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema and reference-data migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn entries(&mut self, sql: &str) -> StoreResult<Vec<LookupEntry>> {
        sqlx::query_as::<_, LookupEntry>(sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn user_where(&mut self, clause: &str, value: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, clause);
        sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_err)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgTx { tx } = *self;
        tx.commit().await.map_err(map_err)
    }

    async fn load_lookups(&mut self) -> StoreResult<LookupRows> {
        Ok(LookupRows {
            roles: self
                .entries("SELECT role_id AS id, name FROM roles ORDER BY role_id")
                .await?,
            statuses: self
                .entries("SELECT status_id AS id, name FROM statuses ORDER BY status_id")
                .await?,
            categories: self
                .entries("SELECT category_id AS id, name FROM categories ORDER BY category_id")
                .await?,
            colours: self
                .entries("SELECT colour_id AS id, name FROM colours ORDER BY colour_id")
                .await?,
            materials: self
                .entries("SELECT material_id AS id, name FROM materials ORDER BY material_id")
                .await?,
            conditions: self
                .entries("SELECT condition_id AS id, name FROM conditions ORDER BY condition_id")
                .await?,
            genders: self
                .entries("SELECT gender_id AS id, name FROM genders ORDER BY gender_id")
                .await?,
            sizes: self
                .entries("SELECT size_id AS id, name FROM sizes ORDER BY size_id")
                .await?,
            notification_types: self
                .entries(
                    "SELECT notification_type_id AS id, name FROM notification_types \
                     ORDER BY notification_type_id",
                )
                .await?,
        })
    }

    async fn find_user(&mut self, user_id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        self.user_where("email", email).await
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        self.user_where("username", username).await
    }

    async fn find_user_by_google_id(&mut self, google_id: &str) -> StoreResult<Option<User>> {
        self.user_where("google_id", google_id).await
    }

    async fn find_user_by_reset_token(&mut self, token_hash: &str) -> StoreResult<Option<User>> {
        self.user_where("reset_token_hash", token_hash).await
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY user_id", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (email, username, password_hash, google_id, role_id, profile_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.email)
            .bind(user.username)
            .bind(user.password_hash)
            .bind(user.google_id)
            .bind(user.role_id)
            .bind(user.profile_url)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn save_user(&mut self, user: &User) -> StoreResult<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET email = $2, username = $3, password_hash = $4, google_id = $5, role_id = $6,
                profile_url = $7, reset_token_hash = $8, reset_token_expires_at = $9
            WHERE user_id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.user_id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.google_id)
            .bind(user.role_id)
            .bind(&user.profile_url)
            .bind(&user.reset_token_hash)
            .bind(user.reset_token_expires_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn delete_users(&mut self, user_ids: &[i64]) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = ANY($1)")
            .bind(user_ids.to_vec())
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_donation(&mut self, donation: NewDonation) -> StoreResult<Donation> {
        let sql = format!(
            r#"
            INSERT INTO donations (
                title, description, quantity, weight, co2_saved, photo_url, user_id,
                charity_id, status_id, category_id, colour_id, material_id, condition_id,
                gender_id, size_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, Donation>(&sql)
            .bind(donation.title)
            .bind(donation.description)
            .bind(donation.quantity)
            .bind(donation.weight)
            .bind(donation.co2_saved)
            .bind(donation.photo_url)
            .bind(donation.user_id)
            .bind(donation.charity_id)
            .bind(donation.status_id)
            .bind(donation.category_id)
            .bind(donation.colour_id)
            .bind(donation.material_id)
            .bind(donation.condition_id)
            .bind(donation.gender_id)
            .bind(donation.size_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn insert_donation_images(
        &mut self,
        donation_id: i64,
        image_refs: &[String],
    ) -> StoreResult<Vec<DonationImage>> {
        let mut images = Vec::with_capacity(image_refs.len());
        for (position, image_ref) in image_refs.iter().enumerate() {
            let image = sqlx::query_as::<_, DonationImage>(
                r#"
                INSERT INTO donation_images (donation_id, image_ref, position)
                VALUES ($1, $2, $3)
                RETURNING image_id, donation_id, image_ref, position
                "#,
            )
            .bind(donation_id)
            .bind(image_ref)
            .bind(position as i32)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_err)?;
            images.push(image);
        }
        Ok(images)
    }

    async fn list_donation_images(&mut self, donation_id: i64) -> StoreResult<Vec<DonationImage>> {
        sqlx::query_as::<_, DonationImage>(
            r#"
            SELECT image_id, donation_id, image_ref, position
            FROM donation_images
            WHERE donation_id = $1
            ORDER BY position
            "#,
        )
        .bind(donation_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_err)
    }

    async fn find_donation(&mut self, donation_id: i64) -> StoreResult<Option<Donation>> {
        let sql = format!(
            "SELECT {} FROM donations WHERE donation_id = $1",
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, Donation>(&sql)
            .bind(donation_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn list_donations_for_user(&mut self, user_id: i64) -> StoreResult<Vec<Donation>> {
        let sql = format!(
            "SELECT {} FROM donations WHERE user_id = $1 \
             ORDER BY created_at DESC, donation_id DESC",
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, Donation>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn list_donations_by_status(&mut self, status_id: i32) -> StoreResult<Vec<Donation>> {
        let sql = format!(
            "SELECT {} FROM donations WHERE status_id = $1 ORDER BY created_at, donation_id",
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, Donation>(&sql)
            .bind(status_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn count_donations_for_user(&mut self, user_id: i64) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM donations WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(count)
    }

    async fn update_donation(
        &mut self,
        donation_id: i64,
        changes: &DonationChanges,
    ) -> StoreResult<Option<Donation>> {
        let sql = format!(
            r#"
            UPDATE donations
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                quantity = COALESCE($4, quantity),
                category_id = COALESCE($5, category_id),
                colour_id = COALESCE($6, colour_id),
                material_id = COALESCE($7, material_id),
                condition_id = COALESCE($8, condition_id),
                gender_id = COALESCE($9, gender_id),
                size_id = COALESCE($10, size_id),
                updated_at = NOW()
            WHERE donation_id = $1
            RETURNING {}
            "#,
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, Donation>(&sql)
            .bind(donation_id)
            .bind(&changes.title)
            .bind(&changes.description)
            .bind(changes.quantity)
            .bind(changes.category_id)
            .bind(changes.colour_id)
            .bind(changes.material_id)
            .bind(changes.condition_id)
            .bind(changes.gender_id)
            .bind(changes.size_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn set_donation_status(
        &mut self,
        donation_id: i64,
        status_id: i32,
    ) -> StoreResult<Option<Donation>> {
        let sql = format!(
            r#"
            UPDATE donations
            SET status_id = $2, updated_at = NOW()
            WHERE donation_id = $1
            RETURNING {}
            "#,
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, Donation>(&sql)
            .bind(donation_id)
            .bind(status_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn delete_donation(&mut self, donation_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM donations WHERE donation_id = $1")
            .bind(donation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        // A savepoint keeps a failed insert from aborting the outer transaction.
        let mut savepoint = Connection::begin(&mut *self.tx).await.map_err(map_err)?;
        let sql = format!(
            r#"
            INSERT INTO notifications (user_id, notification_type_id, message, is_read)
            VALUES ($1, $2, $3, FALSE)
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Notification>(&sql)
            .bind(notification.user_id)
            .bind(notification.notification_type_id)
            .bind(notification.message)
            .fetch_one(&mut *savepoint)
            .await;

        match inserted {
            Ok(row) => {
                savepoint.commit().await.map_err(map_err)?;
                Ok(row)
            }
            Err(err) => {
                savepoint.rollback().await.map_err(map_err)?;
                Err(map_err(err))
            }
        }
    }

    async fn has_notification(
        &mut self,
        user_id: i64,
        notification_type_id: i32,
    ) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM notifications \
             WHERE user_id = $1 AND notification_type_id = $2)",
        )
        .bind(user_id)
        .bind(notification_type_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_err)
    }

    async fn list_unread_notifications(&mut self, user_id: i64) -> StoreResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE user_id = $1 AND is_read = FALSE \
             ORDER BY created_at DESC, notification_id DESC",
            NOTIFICATION_COLUMNS
        );
        sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_err)
    }

    async fn mark_notification_read(
        &mut self,
        user_id: i64,
        notification_id: i64,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE notification_id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }
}
