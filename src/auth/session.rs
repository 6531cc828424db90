/// Refresh Session Store
///
/// Persists one record per outstanding refresh token. Records hold only the
/// SHA-256 hash of the token, so read access to the store is not enough to
/// mint a session. A refresh token is usable only while its record exists:
/// deleting the record (logout, rotation, password change) revokes it even
/// though its signature stays valid.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::claims::UserId;
use crate::database::{with_timeout, DEFAULT_QUERY_TIMEOUT};
use crate::error::AppError;

/// Persisted proof that a refresh token is still live
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session to be created for a freshly issued refresh token
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: UserId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Hash a refresh token using SHA-256
///
/// Never store plaintext tokens.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session; token hashes are unique
    async fn create(&self, session: NewSession) -> Result<SessionRecord, AppError>;

    /// Look up the session owned by `user_id` with the given token hash
    async fn find(&self, user_id: UserId, token_hash: &str)
        -> Result<Option<SessionRecord>, AppError>;

    /// Delete the session with the given token hash; `false` if none existed
    async fn delete(&self, token_hash: &str) -> Result<bool, AppError>;

    /// Delete every session of a user, returning how many were removed
    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, AppError>;

    /// Delete sessions that expired at or before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

fn store_unavailable(err: impl std::fmt::Display) -> AppError {
    AppError::StoreUnavailable(err.to_string())
}

/// Postgres-backed session store (`refresh_tokens` table)
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgSessionStore {
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
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: NewSession) -> Result<SessionRecord, AppError> {
        let record = with_timeout(
            self.timeout,
            sqlx::query_as::<_, SessionRecord>(
                r#"
                INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, user_id, token_hash, expires_at, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(session.user_id)
            .bind(&session.token_hash)
            .bind(session.expires_at)
            .bind(Utc::now())
            .fetch_one(&self.pool),
        )
        .await
        .map_err(store_unavailable)?;

        Ok(record)
    }

    async fn find(
        &self,
        user_id: UserId,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, AppError> {
        with_timeout(
            self.timeout,
            sqlx::query_as::<_, SessionRecord>(
                r#"
                SELECT id, user_id, token_hash, expires_at, created_at
                FROM refresh_tokens
                WHERE user_id = $1 AND token_hash = $2
                "#,
            )
            .bind(user_id)
            .bind(token_hash)
            .fetch_optional(&self.pool),
        )
        .await
        .map_err(store_unavailable)
    }

    async fn delete(&self, token_hash: &str) -> Result<bool, AppError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .execute(&self.pool),
        )
        .await
        .map_err(store_unavailable)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, AppError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await
        .map_err(store_unavailable)?;

        tracing::info!(user_id = %user_id, "All refresh sessions revoked for user");
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool),
        )
        .await
        .map_err(store_unavailable)?;

        Ok(result.rows_affected())
    }
}

/// In-process session store keyed by token hash
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: NewSession) -> Result<SessionRecord, AppError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.token_hash) {
            return Err(store_unavailable("duplicate refresh token hash"));
        }

        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            created_at: Utc::now(),
        };
        sessions.insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn find(
        &self,
        user_id: UserId,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, AppError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(token_hash)
            .filter(|record| record.user_id == user_id)
            .cloned())
    }

    async fn delete(&self, token_hash: &str) -> Result<bool, AppError> {
        Ok(self.sessions.write().await.remove(token_hash).is_some())
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }
}
