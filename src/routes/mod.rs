mod admin;
mod auth;
mod health_check;
mod users;

pub use admin::{change_user_role, list_users};
pub use auth::{login, logout, refresh, register};
pub use health_check::health_check;
pub use users::{change_password, delete_account, get_profile, update_profile};
