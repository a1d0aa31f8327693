use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::round2;

/// Kilograms of CO2 avoided per kilogram of reused clothing.
pub const CO2_PER_KG: f64 = 9.0;

/// Weight used for categories without an entry in `CATEGORY_WEIGHTS`.
pub const DEFAULT_ITEM_WEIGHT: f64 = 0.5;

const CATEGORY_WEIGHTS: &[(&str, f64)] = &[
    ("Tops", 0.3),
    ("Bottoms", 0.5),
    ("Outerwear", 1.2),
    ("Shoes", 0.9),
    ("Dresses", 0.4),
    ("Accessories", 0.2),
    ("Bags", 0.6),
    ("Jewelry", 0.1),
    ("Activewear", 0.3),
    ("Swimwear", 0.2),
    ("Suits & Blazers", 1.0),
];

pub fn estimate_weight(category: &str) -> f64 {
    CATEGORY_WEIGHTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(category))
        .map(|(_, weight)| *weight)
        .unwrap_or(DEFAULT_ITEM_WEIGHT)
}

pub fn estimate_co2_saved(weight: f64) -> f64 {
    round2(weight * CO2_PER_KG)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum DonationStatus {
    Submitted = 1,
    InTransit = 2,
    ReceivedAtCharity = 3,
    Accepted = 4,
    Rejected = 5,
}

impl DonationStatus {
    pub const ALL: [DonationStatus; 5] = [
        DonationStatus::Submitted,
        DonationStatus::InTransit,
        DonationStatus::ReceivedAtCharity,
        DonationStatus::Accepted,
        DonationStatus::Rejected,
    ];

    pub fn id(self) -> i32 {
        self as i32
    }

    /// Name seeded in the `statuses` table.
    pub fn name(self) -> &'static str {
        match self {
            DonationStatus::Submitted => "On its way",
            DonationStatus::InTransit => "In transit",
            DonationStatus::ReceivedAtCharity => "Received at Charity",
            DonationStatus::Accepted => "Accepted",
            DonationStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DonationStatus::Accepted | DonationStatus::Rejected)
    }

    /// Forward-only moves; a decision is only taken once the item is at the charity.
    pub fn can_transition_to(self, target: DonationStatus) -> bool {
        if self.is_terminal() || target <= self {
            return false;
        }
        match target {
            DonationStatus::Accepted | DonationStatus::Rejected => {
                self == DonationStatus::ReceivedAtCharity
            }
            _ => true,
        }
    }
}

impl TryFrom<i32> for DonationStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        DonationStatus::ALL
            .into_iter()
            .find(|status| status.id() == value)
            .ok_or_else(|| format!("unknown status id {}", value))
    }
}

impl From<DonationStatus> for i32 {
    fn from(status: DonationStatus) -> Self {
        status.id()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Donation {
    pub donation_id: i64,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    pub fn status(&self) -> Option<DonationStatus> {
        DonationStatus::try_from(self.status_id).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DonationImage {
    pub image_id: i64,
    pub donation_id: i64,
    pub image_ref: String,
    pub position: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use DonationStatus::*;

    #[test]
    fn outerwear_weight_and_emissions() {
        let weight = estimate_weight("Outerwear");
        assert_eq!(weight, 1.2);
        assert_eq!(estimate_co2_saved(weight), 10.8);
    }

    #[test]
    fn tops_weight() {
        assert_eq!(estimate_weight("Tops"), 0.3);
        assert_eq!(estimate_co2_saved(0.3), 2.7);
    }

    #[test]
    fn unmapped_category_uses_default() {
        assert_eq!(estimate_weight("Hats"), DEFAULT_ITEM_WEIGHT);
    }

    #[test]
    fn logistics_moves_forward() {
        assert!(Submitted.can_transition_to(InTransit));
        assert!(Submitted.can_transition_to(ReceivedAtCharity));
        assert!(InTransit.can_transition_to(ReceivedAtCharity));
        assert!(ReceivedAtCharity.can_transition_to(Accepted));
        assert!(ReceivedAtCharity.can_transition_to(Rejected));
    }

    #[test]
    fn backwards_and_repeated_moves_are_rejected() {
        assert!(!InTransit.can_transition_to(Submitted));
        assert!(!ReceivedAtCharity.can_transition_to(InTransit));
        assert!(!InTransit.can_transition_to(InTransit));
    }

    #[test]
    fn decisions_require_arrival() {
        assert!(!Submitted.can_transition_to(Accepted));
        assert!(!InTransit.can_transition_to(Rejected));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for target in DonationStatus::ALL {
            assert!(!Accepted.can_transition_to(target));
            assert!(!Rejected.can_transition_to(target));
        }
    }

    #[test]
    fn status_ids_cover_exactly_five_values() {
        for id in 1..=5 {
            assert_eq!(DonationStatus::try_from(id).unwrap().id(), id);
        }
        assert!(DonationStatus::try_from(0).is_err());
        assert!(DonationStatus::try_from(6).is_err());
    }
}
