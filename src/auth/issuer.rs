/// Token Issuer
///
/// Mints an access/refresh pair for an identity and persists the refresh
/// half. Both tokens are signed before the store is touched, so a signing
/// failure never leaves an orphaned session behind.

use serde::Serialize;
use std::sync::Arc;

use crate::auth::claims::{AccessClaims, RefreshClaims, Role, UserId};
use crate::auth::jwt::TokenCodec;
use crate::auth::session::{hash_token, NewSession, SessionStore};
use crate::configuration::JwtSettings;
use crate::error::AppError;

/// Tokens handed to the client after login or refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    codec: TokenCodec,
    settings: JwtSettings,
    sessions: Arc<dyn SessionStore>,
}

impl TokenIssuer {
    pub fn new(codec: TokenCodec, settings: JwtSettings, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            codec,
            settings,
            sessions,
        }
    }

    /// Issue a fresh pair for `user_id` acting as `role`
    ///
    /// # Errors
    /// `AppError::Issuance` if either token cannot be signed or the refresh
    /// session cannot be stored
    pub async fn issue_token_pair(&self, user_id: UserId, role: Role) -> Result<TokenPair, AppError> {
        let access = self
            .codec
            .issue(
                AccessClaims { sub: user_id, role },
                &self.settings.access_secret,
                self.settings.access_lifetime(),
            )
            .map_err(|e| AppError::Issuance(e.to_string()))?;

        let refresh = self
            .codec
            .issue(
                RefreshClaims::new(user_id),
                &self.settings.refresh_secret,
                self.settings.refresh_lifetime(),
            )
            .map_err(|e| AppError::Issuance(e.to_string()))?;

        self.sessions
            .create(NewSession {
                user_id,
                token_hash: hash_token(&refresh.token),
                expires_at: refresh.expires_at,
            })
            .await
            .map_err(|e| AppError::Issuance(e.to_string()))?;

        tracing::debug!(user_id = %user_id, role = %role, "Token pair issued");

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.settings.access_lifetime().num_seconds(),
        })
    }
}
