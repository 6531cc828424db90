/// JWT Token Codec
///
/// Encodes typed claim sets into HS256-signed tokens and decodes them back.
/// The secret and lifetime are supplied per call, so the same codec serves
/// both token classes with their independent keys.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::claims::SignedClaims;
use crate::auth::clock::{Clock, SystemClock};
use crate::error::TokenError;

/// A freshly signed token and the instant it stops being valid
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(issuer: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: issuer.into(),
            clock,
        }
    }

    pub fn with_system_clock(issuer: impl Into<String>) -> Self {
        Self::new(issuer, Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign `claims` with `secret`, expiring `lifetime` from now
    ///
    /// # Errors
    /// Returns `TokenError::Signing` if serialization or signing fails
    pub fn issue<C: Serialize>(
        &self,
        claims: C,
        secret: &str,
        lifetime: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let exp = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| TokenError::Signing("expiry out of range".to_string()))?
            .timestamp();
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0)
            .ok_or_else(|| TokenError::Signing("expiry out of range".to_string()))?;

        let signed = SignedClaims {
            claims,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &signed,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Validate `token` against `secret` and extract its typed claims
    ///
    /// # Errors
    /// - `InvalidSignature` if the MAC does not match `secret`
    /// - `Expired` once the clock reaches the `exp` claim
    /// - `Malformed` for undecodable tokens, wrong issuer or unexpected claim shape
    pub fn verify<C: DeserializeOwned>(&self, token: &str, secret: &str) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        // Expiry is checked against `self.clock` below.
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<SignedClaims<C>>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(classify)?;

        if self.clock.now().timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims.claims)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed(err.to_string()),
    }
}
