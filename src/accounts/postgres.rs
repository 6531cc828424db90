use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::{is_email_login, Account, AccountStore, NewAccount, Profile};
use crate::auth::{Role, UserId};
use crate::database::{with_timeout, DEFAULT_QUERY_TIMEOUT};
use crate::error::{AppError, DatabaseError};

const ACCOUNT_COLUMNS: &str = "id, email, username, password_hash, role, email_verified, created_at";

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: UserId,
    email: String,
    username: String,
    password_hash: String,
    role: String,
    email_verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = AppError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|_| {
            AppError::Database(DatabaseError::UnexpectedError(format!(
                "account {} has unknown role {:?}",
                row.id, row.role
            )))
        })?;

        Ok(Account {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            role,
            email_verified: row.email_verified,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    first_name: String,
    last_name: String,
    bio: String,
    avatar_url: String,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            first_name: row.first_name,
            last_name: row.last_name,
            bio: row.bio,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountWithProfileRow {
    #[sqlx(flatten)]
    account: AccountRow,
    first_name: Option<String>,
    last_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
}

/// Postgres-backed account store (`users` and `user_profiles` tables)
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_account(&self, sql: &str, key: &str) -> Result<Option<Account>, AppError> {
        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, AccountRow>(sql)
                .bind(key)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Account::try_from).transpose()
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, username, password_hash, role, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, 'user', false, $4, $4)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );

        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, AccountRow>(&sql)
                .bind(&account.email)
                .bind(&account.username)
                .bind(&account.password_hash)
                .bind(Utc::now())
                .fetch_one(&self.pool),
        )
        .await?;

        Account::try_from(row)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<Account>, AppError> {
        let column = if is_email_login(login) { "email" } else { "username" };
        let sql = format!("SELECT {} FROM users WHERE {} = $1", ACCOUNT_COLUMNS, column);
        self.fetch_account(&sql, login).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", ACCOUNT_COLUMNS);
        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, AccountRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> Result<(), AppError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(
                "User not found".to_string(),
            )));
        }
        Ok(())
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<Account>, AppError> {
        let sql = format!(
            "UPDATE users SET role = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, AccountRow>(&sql)
                .bind(role.as_str())
                .bind(Utc::now())
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn delete_account(&self, id: UserId) -> Result<(), AppError> {
        let pool = &self.pool;
        with_timeout(self.timeout, async move {
            let mut tx = pool.begin().await?;

            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
                .bind(id)
                .execute(&mut tx)
                .await?;
            sqlx::query("DELETE FROM user_profiles WHERE user_id = $1")
                .bind(id)
                .execute(&mut tx)
                .await?;
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&mut tx)
                .await?;

            tx.commit().await
        })
        .await?;

        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<(Account, Profile)>, AppError> {
        let rows = with_timeout(
            self.timeout,
            sqlx::query_as::<_, AccountWithProfileRow>(
                r#"
                SELECT u.id, u.email, u.username, u.password_hash, u.role, u.email_verified,
                       u.created_at, p.first_name, p.last_name, p.bio, p.avatar_url
                FROM users u
                LEFT JOIN user_profiles p ON p.user_id = u.id
                ORDER BY u.created_at, u.id
                "#,
            )
            .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter()
            .map(|row| {
                let profile = Profile {
                    first_name: row.first_name.unwrap_or_default(),
                    last_name: row.last_name.unwrap_or_default(),
                    bio: row.bio.unwrap_or_default(),
                    avatar_url: row.avatar_url.unwrap_or_default(),
                };
                Account::try_from(row.account).map(|account| (account, profile))
            })
            .collect()
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, AppError> {
        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, ProfileRow>(
                "SELECT first_name, last_name, bio, avatar_url FROM user_profiles WHERE user_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(Profile::from))
    }

    async fn upsert_profile(&self, id: UserId, profile: Profile) -> Result<Profile, AppError> {
        let row = with_timeout(
            self.timeout,
            sqlx::query_as::<_, ProfileRow>(
                r#"
                INSERT INTO user_profiles (user_id, first_name, last_name, bio, avatar_url, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                ON CONFLICT (user_id) DO UPDATE
                SET first_name = EXCLUDED.first_name,
                    last_name = EXCLUDED.last_name,
                    bio = EXCLUDED.bio,
                    avatar_url = EXCLUDED.avatar_url,
                    updated_at = EXCLUDED.updated_at
                RETURNING first_name, last_name, bio, avatar_url
                "#,
            )
            .bind(id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.bio)
            .bind(&profile.avatar_url)
            .bind(Utc::now())
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(Profile::from(row))
    }
}
