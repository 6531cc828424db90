/// Account Store
///
/// Accounts, their roles and optional profile fields. The auth core only
/// needs lookups by login and by id; the remaining operations back the
/// profile and admin routes.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{Role, UserId};
use crate::error::AppError;

pub use memory::InMemoryAccountStore;
pub use postgres::PgAccountStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default, rename = "avatarURL")]
    pub avatar_url: String,
}

/// How a login identifier is resolved: anything containing `@` is an email
pub fn is_email_login(login: &str) -> bool {
    login.contains('@')
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account with role `user`
    ///
    /// # Errors
    /// `DatabaseError::UniqueConstraintViolation` if email or username is taken
    async fn create_account(&self, account: NewAccount) -> Result<Account, AppError>;

    /// Look up by email (login contains `@`) or by username
    async fn find_by_login(&self, login: &str) -> Result<Option<Account>, AppError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, AppError>;

    async fn update_password(&self, id: UserId, password_hash: &str) -> Result<(), AppError>;

    /// Change the role, returning the updated account or `None` if unknown
    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<Account>, AppError>;

    /// Remove the account together with its profile
    ///
    /// Refresh sessions are revoked separately through
    /// `AuthService::end_all_sessions`.
    async fn delete_account(&self, id: UserId) -> Result<(), AppError>;

    /// All accounts with their profiles, oldest first
    async fn list_accounts(&self) -> Result<Vec<(Account, Profile)>, AppError>;

    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, AppError>;

    async fn upsert_profile(&self, id: UserId, profile: Profile) -> Result<Profile, AppError>;
}
