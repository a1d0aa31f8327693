pub mod auth;
pub mod donation;
pub mod google;
pub mod logistics;
pub mod mailer;
pub mod notification;
pub mod user;

pub use auth::AuthService;
pub use donation::DonationService;
pub use google::GoogleOAuth;
pub use logistics::{LogisticsPlan, LogisticsRecord, LogisticsScheduler, LogisticsState};
pub use mailer::{LogMailer, MailError, MailMessage, Mailer, WebhookMailer};
pub use notification::{NotificationEmitter, NotificationService};
pub use user::UserService;
