mod handler;
mod model;

pub use handler::{fetch_notifications, update_notification};
