/// Refresh Coordinator
///
/// Exchanges a refresh token for a new pair. The presented token is
/// consumed: the replacement session is stored first and the old record is
/// deleted afterwards, so a failure part way through never leaves the caller
/// without a usable session.
///
/// A refresh moves through `Received -> SignatureValidated ->
/// SessionConfirmed -> Rotated`. Whatever stage it stops in, the caller only
/// learns `InvalidRefreshToken`.

use std::fmt;
use std::sync::Arc;

use crate::accounts::{Account, AccountStore};
use crate::auth::claims::RefreshClaims;
use crate::auth::issuer::{TokenIssuer, TokenPair};
use crate::auth::jwt::TokenCodec;
use crate::auth::session::{hash_token, SessionStore};
use crate::error::{AppError, AuthError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    Received,
    SignatureValidated,
    SessionConfirmed,
    Rotated,
}

impl fmt::Display for RefreshStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshStage::Received => "received",
            RefreshStage::SignatureValidated => "signature_validated",
            RefreshStage::SessionConfirmed => "session_confirmed",
            RefreshStage::Rotated => "rotated",
        };
        f.write_str(name)
    }
}

/// Result of a successful rotation
#[derive(Debug, Clone)]
pub struct RotatedSession {
    /// Account as read at refresh time
    pub account: Account,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    codec: TokenCodec,
    refresh_secret: String,
    issuer: TokenIssuer,
    sessions: Arc<dyn SessionStore>,
    accounts: Arc<dyn AccountStore>,
}

/// Why a rotation stopped, before it is collapsed for the caller
#[derive(Debug)]
enum RefreshFailure {
    Rejected { stage: RefreshStage, reason: String },
    Backend(AppError),
}

impl From<AppError> for RefreshFailure {
    fn from(err: AppError) -> Self {
        RefreshFailure::Backend(err)
    }
}

fn rejected(stage: RefreshStage, reason: impl Into<String>) -> RefreshFailure {
    RefreshFailure::Rejected {
        stage,
        reason: reason.into(),
    }
}

impl RefreshCoordinator {
    pub fn new(
        codec: TokenCodec,
        refresh_secret: impl Into<String>,
        issuer: TokenIssuer,
        sessions: Arc<dyn SessionStore>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            codec,
            refresh_secret: refresh_secret.into(),
            issuer,
            sessions,
            accounts,
        }
    }

    /// Rotate `refresh_token` into a new pair
    ///
    /// # Errors
    /// - `AuthError::InvalidRefreshToken` for a bad signature, an expired
    ///   token, a revoked or consumed session, or a deleted account
    /// - `AppError::StoreUnavailable` / `AppError::Issuance` on backend failure
    pub async fn refresh(&self, refresh_token: &str) -> Result<RotatedSession, AppError> {
        match self.rotate(refresh_token).await {
            Ok(rotated) => Ok(rotated),
            Err(RefreshFailure::Rejected { stage, reason }) => {
                tracing::warn!(stage = %stage, reason = %reason, "Refresh rejected");
                Err(AppError::Auth(AuthError::InvalidRefreshToken))
            }
            Err(RefreshFailure::Backend(e)) => Err(e),
        }
    }

    async fn rotate(&self, refresh_token: &str) -> Result<RotatedSession, RefreshFailure> {
        let mut stage = RefreshStage::Received;

        let claims: RefreshClaims = match self.codec.verify(refresh_token, &self.refresh_secret) {
            Ok(claims) => claims,
            Err(e) => return Err(rejected(stage, e.to_string())),
        };
        stage = RefreshStage::SignatureValidated;

        let token_hash = hash_token(refresh_token);
        let now = self.codec.clock().now();
        match self.sessions.find(claims.sub, &token_hash).await? {
            Some(record) if !record.is_expired_at(now) => {}
            Some(_) => return Err(rejected(stage, "session expired")),
            None => return Err(rejected(stage, "no matching session")),
        }
        stage = RefreshStage::SessionConfirmed;
        tracing::debug!(user_id = %claims.sub, stage = %stage, "Refresh session confirmed");

        // The role may have changed since the token was issued.
        let account = match self.accounts.find_by_id(claims.sub).await? {
            Some(account) => account,
            None => return Err(rejected(stage, "account no longer exists")),
        };

        let tokens = self.issuer.issue_token_pair(account.id, account.role).await?;

        match self.sessions.delete(&token_hash).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    user_id = %account.id,
                    "Consumed refresh session was already gone, concurrent rotation"
                );
            }
            Err(e) => {
                tracing::error!(
                    user_id = %account.id,
                    error = %e,
                    "Failed to delete consumed refresh session"
                );
            }
        }
        stage = RefreshStage::Rotated;

        tracing::info!(user_id = %account.id, stage = %stage, "Refresh token rotated");

        Ok(RotatedSession { account, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryAccountStore;
    use crate::auth::claims::{AccessClaims, Role, UserId};
    use crate::auth::clock::FixedClock;
    use crate::auth::issuer::tests::test_settings;
    use crate::auth::session::{InMemorySessionStore, NewSession, SessionRecord};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    #[derive(Clone, Copy)]
    enum DeleteOutcome {
        Fails,
        /// Another rotation removed the record first
        AlreadyGone,
    }

    /// In-memory store with a misbehaving `delete`
    #[derive(Clone)]
    struct RacyDeleteStore {
        inner: InMemorySessionStore,
        outcome: DeleteOutcome,
    }

    #[async_trait]
    impl SessionStore for RacyDeleteStore {
        async fn create(&self, session: NewSession) -> Result<SessionRecord, AppError> {
            self.inner.create(session).await
        }

        async fn find(
            &self,
            user_id: UserId,
            token_hash: &str,
        ) -> Result<Option<SessionRecord>, AppError> {
            self.inner.find(user_id, token_hash).await
        }

        async fn delete(&self, token_hash: &str) -> Result<bool, AppError> {
            match self.outcome {
                DeleteOutcome::Fails => {
                    Err(AppError::StoreUnavailable("connection reset".to_string()))
                }
                DeleteOutcome::AlreadyGone => {
                    self.inner.delete(token_hash).await?;
                    self.inner.delete(token_hash).await
                }
            }
        }

        async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, AppError> {
            self.inner.delete_all_for_user(user_id).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
            self.inner.purge_expired(now).await
        }
    }

    struct Fixture {
        coordinator: RefreshCoordinator,
        issuer: TokenIssuer,
        codec: TokenCodec,
        clock: FixedClock,
        sessions: InMemorySessionStore,
        accounts: InMemoryAccountStore,
    }

    async fn fixture() -> Fixture {
        let settings = test_settings();
        let clock = FixedClock::new(Utc::now());
        let codec = TokenCodec::new("test", Arc::new(clock.clone()));
        let sessions = InMemorySessionStore::new();
        let accounts = InMemoryAccountStore::new();
        accounts
            .insert(Account {
                id: 42,
                email: "user@example.com".to_string(),
                username: "user42".to_string(),
                password_hash: "unused".to_string(),
                role: Role::User,
                email_verified: false,
                created_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            })
            .await;

        let issuer = TokenIssuer::new(codec.clone(), settings.clone(), Arc::new(sessions.clone()));
        let coordinator = RefreshCoordinator::new(
            codec.clone(),
            settings.refresh_secret,
            issuer.clone(),
            Arc::new(sessions.clone()),
            Arc::new(accounts.clone()),
        );

        Fixture {
            coordinator,
            issuer,
            codec,
            clock,
            sessions,
            accounts,
        }
    }

    fn is_invalid_refresh(result: &Result<RotatedSession, AppError>) -> bool {
        matches!(result, Err(AppError::Auth(AuthError::InvalidRefreshToken)))
    }

    #[tokio::test]
    async fn test_rotation_consumes_the_presented_token() {
        let f = fixture().await;
        let first = f.issuer.issue_token_pair(42, Role::User).await.unwrap();

        let rotated = f.coordinator.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(rotated.tokens.refresh_token, first.refresh_token);
        assert_eq!(f.sessions.len().await, 1);

        let replay = f.coordinator.refresh(&first.refresh_token).await;
        assert!(is_invalid_refresh(&replay));

        assert!(f.coordinator.refresh(&rotated.tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let f = fixture().await;
        let pair = f.issuer.issue_token_pair(42, Role::User).await.unwrap();

        let result = f.coordinator.refresh(&pair.access_token).await;
        assert!(is_invalid_refresh(&result));
    }

    #[tokio::test]
    async fn test_revoked_session_is_rejected() {
        let f = fixture().await;
        let pair = f.issuer.issue_token_pair(42, Role::User).await.unwrap();
        f.sessions.delete(&hash_token(&pair.refresh_token)).await.unwrap();

        let result = f.coordinator.refresh(&pair.refresh_token).await;
        assert!(is_invalid_refresh(&result));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_rejected() {
        let f = fixture().await;
        let pair = f.issuer.issue_token_pair(42, Role::User).await.unwrap();
        f.clock.advance(Duration::days(7));

        let result = f.coordinator.refresh(&pair.refresh_token).await;
        assert!(is_invalid_refresh(&result));
    }

    #[tokio::test]
    async fn test_role_is_reread_at_refresh_time() {
        let f = fixture().await;
        let pair = f.issuer.issue_token_pair(42, Role::User).await.unwrap();
        f.accounts.set_role(42, Role::Admin).await.unwrap();

        let rotated = f.coordinator.refresh(&pair.refresh_token).await.unwrap();
        let claims: AccessClaims = f
            .codec
            .verify(&rotated.tokens.access_token, &test_settings().access_secret)
            .unwrap();

        assert_eq!(claims.role, Role::Admin);
        assert_eq!(rotated.account.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_deleted_account_cannot_refresh() {
        let f = fixture().await;
        let pair = f.issuer.issue_token_pair(42, Role::User).await.unwrap();
        f.accounts.delete_account(42).await.unwrap();

        let result = f.coordinator.refresh(&pair.refresh_token).await;
        assert!(is_invalid_refresh(&result));
    }

    async fn rotate_with(outcome: DeleteOutcome) -> (Fixture, TokenPair, RotatedSession) {
        let f = fixture().await;
        let store = RacyDeleteStore {
            inner: f.sessions.clone(),
            outcome,
        };
        let issuer = TokenIssuer::new(f.codec.clone(), test_settings(), Arc::new(store.clone()));
        let coordinator = RefreshCoordinator::new(
            f.codec.clone(),
            test_settings().refresh_secret,
            issuer.clone(),
            Arc::new(store),
            Arc::new(f.accounts.clone()),
        );

        let first = issuer.issue_token_pair(42, Role::User).await.unwrap();
        let rotated = coordinator
            .refresh(&first.refresh_token)
            .await
            .expect("Rotation should not surface the delete outcome");

        (f, first, rotated)
    }

    #[tokio::test]
    async fn test_failed_delete_of_consumed_session_still_rotates() {
        let (f, first, rotated) = rotate_with(DeleteOutcome::Fails).await;

        assert_ne!(rotated.tokens.refresh_token, first.refresh_token);
        let new_hash = hash_token(&rotated.tokens.refresh_token);
        assert!(f.sessions.find(42, &new_hash).await.unwrap().is_some());
        // The consumed record lingers until it expires.
        assert_eq!(f.sessions.len().await, 2);
    }

    #[tokio::test]
    async fn test_consumed_session_already_gone_still_rotates() {
        let (f, first, rotated) = rotate_with(DeleteOutcome::AlreadyGone).await;

        let new_hash = hash_token(&rotated.tokens.refresh_token);
        assert!(f.sessions.find(42, &new_hash).await.unwrap().is_some());
        assert!(f
            .sessions
            .find(42, &hash_token(&first.refresh_token))
            .await
            .unwrap()
            .is_none());
        assert_eq!(f.sessions.len().await, 1);
    }

    fn rejected_at(result: Result<RotatedSession, RefreshFailure>) -> RefreshStage {
        match result {
            Err(RefreshFailure::Rejected { stage, .. }) => stage,
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejections_report_the_stage_reached() {
        let f = fixture().await;
        let pair = f.issuer.issue_token_pair(42, Role::User).await.unwrap();

        let stage = rejected_at(f.coordinator.rotate("not-a-token").await);
        assert_eq!(stage, RefreshStage::Received);

        let unknown = f
            .codec
            .issue(RefreshClaims::new(42), &test_settings().refresh_secret, Duration::days(1))
            .unwrap();
        let stage = rejected_at(f.coordinator.rotate(&unknown.token).await);
        assert_eq!(stage, RefreshStage::SignatureValidated);

        f.accounts.delete_account(42).await.unwrap();
        let stage = rejected_at(f.coordinator.rotate(&pair.refresh_token).await);
        assert_eq!(stage, RefreshStage::SessionConfirmed);
        // The session itself was valid and is left for logout or cleanup.
        assert_eq!(f.sessions.len().await, 1);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(RefreshStage::SignatureValidated.to_string(), "signature_validated");
        assert_eq!(RefreshStage::Rotated.to_string(), "rotated");
    }
}
