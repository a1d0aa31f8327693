use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    DonationMilestone,
    SystemAlert,
    CharityUpdate,
    AccountSecurity,
    ProfileUpdate,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::DonationMilestone,
        NotificationKind::SystemAlert,
        NotificationKind::CharityUpdate,
        NotificationKind::AccountSecurity,
        NotificationKind::ProfileUpdate,
    ];

    /// Tag stored in `notification_types.name`.
    pub fn tag(self) -> &'static str {
        match self {
            NotificationKind::DonationMilestone => "DONATION_MILESTONE",
            NotificationKind::SystemAlert => "SYSTEM_ALERT",
            NotificationKind::CharityUpdate => "CHARITY_UPDATE",
            NotificationKind::AccountSecurity => "ACCOUNT_SECURITY",
            NotificationKind::ProfileUpdate => "PROFILE_UPDATE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub notification_id: i64,
    pub user_id: i64,
    pub notification_type_id: i32,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
