mod donation;
mod lookup;
mod notification;
mod user;

pub use donation::{
    CO2_PER_KG, DEFAULT_ITEM_WEIGHT, Donation, DonationImage, DonationStatus, estimate_co2_saved,
    estimate_weight,
};
pub use lookup::LookupEntry;
pub use notification::{Notification, NotificationKind};
pub use user::{Role, User};
