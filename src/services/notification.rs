use std::sync::Arc;

use crate::database::{NewNotification, Store, StoreTx};
use crate::error::AppError;
use crate::lookups::Lookups;
use crate::models::{Notification, NotificationKind};

/// Best-effort alert writer. It runs inside the caller's transaction and never
/// fails it: unknown types and insert errors are logged and skipped.
#[derive(Clone)]
pub struct NotificationEmitter {
    lookups: Arc<Lookups>,
}

impl NotificationEmitter {
    pub fn new(lookups: Arc<Lookups>) -> Self {
        Self { lookups }
    }

    pub async fn emit(
        &self,
        tx: &mut dyn StoreTx,
        user_id: i64,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Option<Notification> {
        let Some(type_id) = self.lookups.notification_type_id(kind.tag()) else {
            tracing::warn!("Notification type \"{}\" not found; skipping", kind.tag());
            return None;
        };

        let inserted = tx
            .insert_notification(NewNotification {
                user_id,
                notification_type_id: type_id,
                message: message.into(),
            })
            .await;

        match inserted {
            Ok(notification) => {
                tracing::debug!("Notification created for user {}: {}", user_id, kind.tag());
                Some(notification)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to create {} notification for user {}: {}",
                    kind.tag(),
                    user_id,
                    e
                );
                None
            }
        }
    }

    /// Like `emit`, but skipped when the user already holds a notification of
    /// this kind.
    pub async fn emit_once(
        &self,
        tx: &mut dyn StoreTx,
        user_id: i64,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Option<Notification> {
        let Some(type_id) = self.lookups.notification_type_id(kind.tag()) else {
            tracing::warn!("Notification type \"{}\" not found; skipping", kind.tag());
            return None;
        };
        match tx.has_notification(user_id, type_id).await {
            Ok(false) => self.emit(tx, user_id, kind, message).await,
            Ok(true) => {
                tracing::debug!("User {} already has a {} notification", user_id, kind.tag());
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Could not check {} notifications for user {}: {}",
                    kind.tag(),
                    user_id,
                    e
                );
                None
            }
        }
    }
}

pub struct NotificationService {
    store: Arc<dyn Store>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_unread(&self, user_id: i64) -> Result<Vec<Notification>, AppError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_unread_notifications(user_id).await?)
    }

    /// Only the owner can flip a notification; anything else reads as missing.
    pub async fn mark_read(&self, user_id: i64, notification_id: i64) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        if !tx.mark_notification_read(user_id, notification_id).await? {
            return Err(AppError::not_found("Notification not found"));
        }
        tx.commit().await?;
        Ok(())
    }
}
