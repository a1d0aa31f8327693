mod handler;
mod model;

pub use handler::{
    add_donation, delete_donation, donation_images, donation_logistics, fetch_donation,
    fetch_donation_count, fetch_donations, staff_donations, update_donation,
    update_donation_status,
};
