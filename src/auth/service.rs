/// Authentication service
///
/// Single entry point the HTTP layer talks to. Wires the hasher, codec,
/// issuer, refresh coordinator and gates over one pair of stores.

use std::sync::Arc;

use crate::accounts::{Account, AccountStore};
use crate::auth::claims::{Identity, Role, UserId};
use crate::auth::clock::{Clock, SystemClock};
use crate::auth::gate::AuthGate;
use crate::auth::issuer::{TokenIssuer, TokenPair};
use crate::auth::jwt::TokenCodec;
use crate::auth::password::CredentialHasher;
use crate::auth::refresh::{RefreshCoordinator, RotatedSession};
use crate::auth::session::{hash_token, SessionStore};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Verified against when the login names no account, so that unknown
/// users cost the same bcrypt work as wrong passwords.
const TIMING_DUMMY_PASSWORD: &str = "timing-equalization-placeholder";

pub struct AuthService {
    hasher: CredentialHasher,
    issuer: TokenIssuer,
    coordinator: RefreshCoordinator,
    gate: AuthGate,
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        settings: JwtSettings,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, AppError> {
        Self::with_clock(settings, accounts, sessions, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: JwtSettings,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        settings.validate()?;

        let hasher = CredentialHasher::new(settings.hash_cost);
        let dummy_hash = hasher.hash_password(TIMING_DUMMY_PASSWORD)?;
        let codec = TokenCodec::new(settings.issuer.clone(), clock);

        let gate = AuthGate::new(codec.clone(), settings.access_secret.clone());
        let refresh_secret = settings.refresh_secret.clone();
        let issuer = TokenIssuer::new(codec.clone(), settings, sessions.clone());
        let coordinator = RefreshCoordinator::new(
            codec,
            refresh_secret,
            issuer.clone(),
            sessions.clone(),
            accounts.clone(),
        );

        Ok(Self {
            hasher,
            issuer,
            coordinator,
            gate,
            accounts,
            sessions,
            dummy_hash,
        })
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Resolve `login` (email or username) and check `password`
    ///
    /// # Errors
    /// `AuthError::InvalidCredentials` for an unknown login and for a wrong
    /// password alike
    pub async fn verify_credentials(&self, login: &str, password: &str) -> Result<Account, AppError> {
        match self.accounts.find_by_login(login).await? {
            Some(account) => {
                if self.hasher.verify_password(&account.password_hash, password)? {
                    Ok(account)
                } else {
                    Err(AuthError::InvalidCredentials.into())
                }
            }
            None => {
                // Result is irrelevant, only the work matters.
                let _ = self.hasher.verify_password(&self.dummy_hash, password);
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }

    pub async fn issue_session(&self, user_id: UserId, role: Role) -> Result<TokenPair, AppError> {
        self.issuer.issue_token_pair(user_id, role).await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<RotatedSession, AppError> {
        self.coordinator.refresh(refresh_token).await
    }

    /// Revoke the session behind `refresh_token`; unknown tokens are ignored
    pub async fn end_session(&self, refresh_token: &str) -> Result<(), AppError> {
        let removed = self.sessions.delete(&hash_token(refresh_token)).await?;
        tracing::info!(removed = removed, "Refresh session ended");
        Ok(())
    }

    /// Revoke every session of `user_id`
    pub async fn end_all_sessions(&self, user_id: UserId) -> Result<u64, AppError> {
        self.sessions.delete_all_for_user(user_id).await
    }

    pub fn authenticate(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        self.gate.authenticate(header)
    }

    pub fn authorize(&self, identity: Option<&Identity>, required: &[Role]) -> Result<(), AuthError> {
        AuthGate::authorize(identity, required)
    }
}
