mod handler;
mod model;

pub use handler::{
    create_users, delete_own_user, delete_users, fetch_userinfo, fetch_users, update_userinfo,
    update_users,
};
