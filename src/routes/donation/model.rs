use serde::Deserialize;

use crate::database::DonationChanges;
use crate::services::donation::DonationDraft;

#[derive(Debug, Deserialize)]
pub struct DonationQuery {
    #[serde(rename = "donationId")]
    pub donation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDonationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub category_id: Option<i32>,
    pub colour_id: Option<i32>,
    pub material_id: Option<i32>,
    pub condition_id: Option<i32>,
    pub gender_id: Option<i32>,
    pub size_id: Option<i32>,
    /// Image references in display order.
    #[serde(default)]
    pub images: Vec<String>,
}

impl From<CreateDonationRequest> for DonationDraft {
    fn from(req: CreateDonationRequest) -> Self {
        DonationDraft {
            title: req.title,
            description: req.description,
            quantity: req.quantity,
            category_id: req.category_id,
            colour_id: req.colour_id,
            material_id: req.material_id,
            condition_id: req.condition_id,
            gender_id: req.gender_id,
            size_id: req.size_id,
            images: req.images,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateDonationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub category_id: Option<i32>,
    pub colour_id: Option<i32>,
    pub material_id: Option<i32>,
    pub condition_id: Option<i32>,
    pub gender_id: Option<i32>,
    pub size_id: Option<i32>,
}

impl From<UpdateDonationRequest> for DonationChanges {
    fn from(req: UpdateDonationRequest) -> Self {
        DonationChanges {
            title: req.title,
            description: req.description,
            quantity: req.quantity,
            category_id: req.category_id,
            colour_id: req.colour_id,
            material_id: req.material_id,
            condition_id: req.condition_id,
            gender_id: req.gender_id,
            size_id: req.size_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status_id: Option<i32>,
}
