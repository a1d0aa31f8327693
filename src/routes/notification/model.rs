use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(rename = "notificationId")]
    pub notification_id: Option<String>,
}
