use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{is_email_login, Account, AccountStore, NewAccount, Profile};
use crate::auth::{Role, UserId};
use crate::error::{AppError, DatabaseError};

#[derive(Default)]
struct Tables {
    next_id: UserId,
    accounts: HashMap<UserId, Account>,
    profiles: HashMap<UserId, Profile>,
}

/// In-process account store, used by the test suite
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with a fixed id and role
    pub async fn insert(&self, account: Account) {
        let mut tables = self.tables.write().await;
        tables.next_id = tables.next_id.max(account.id);
        tables.accounts.insert(account.id, account);
    }
}

fn not_found() -> AppError {
    AppError::Database(DatabaseError::NotFound("User not found".to_string()))
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, AppError> {
        let mut tables = self.tables.write().await;

        let taken = tables
            .accounts
            .values()
            .any(|a| a.email == account.email || a.username == account.username);
        if taken {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Email or username already exists".to_string(),
            )));
        }

        tables.next_id += 1;
        let created = Account {
            id: tables.next_id,
            email: account.email,
            username: account.username,
            password_hash: account.password_hash,
            role: Role::User,
            email_verified: false,
            created_at: Utc::now(),
        };
        tables.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<Account>, AppError> {
        let by_email = is_email_login(login);
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| {
                if by_email {
                    a.email == login
                } else {
                    a.username == login
                }
            })
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, AppError> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let account = tables.accounts.get_mut(&id).ok_or_else(not_found)?;
        account.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<Account>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.accounts.get_mut(&id).map(|account| {
            account.role = role;
            account.clone()
        }))
    }

    async fn delete_account(&self, id: UserId) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.profiles.remove(&id);
        tables.accounts.remove(&id);
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<(Account, Profile)>, AppError> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<(Account, Profile)> = tables
            .accounts
            .values()
            .map(|account| {
                let profile = tables.profiles.get(&account.id).cloned().unwrap_or_default();
                (account.clone(), profile)
            })
            .collect();
        accounts.sort_by_key(|(account, _)| (account.created_at, account.id));
        Ok(accounts)
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, AppError> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn upsert_profile(&self, id: UserId, profile: Profile) -> Result<Profile, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&id) {
            return Err(not_found());
        }
        tables.profiles.insert(id, profile.clone());
        Ok(profile)
    }
}
