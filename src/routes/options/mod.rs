mod handler;

pub use handler::{donation_options, health};
