mod handler;
mod model;

pub use handler::{
    forgot_password, google_callback, google_start, login, register, reset_password,
};
