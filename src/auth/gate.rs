/// Auth Gate and Role Gate
///
/// The auth gate turns an `Authorization` header into a verified
/// `Identity`; the role gate then checks that identity against a required
/// role set. Both are plain functions over their inputs, the actix
/// middleware only adapts them to requests. The gate never consults a
/// store, so an access token stays valid until it expires.

use crate::auth::claims::{AccessClaims, Identity, Role};
use crate::auth::jwt::TokenCodec;
use crate::error::AuthError;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    Unauthorized,
    Forbidden,
}

/// What the gate decided for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Continue(Identity),
    Reject { kind: RejectKind, error: AuthError },
}

impl From<AuthError> for GateOutcome {
    fn from(error: AuthError) -> Self {
        let kind = match error {
            AuthError::Forbidden => RejectKind::Forbidden,
            _ => RejectKind::Unauthorized,
        };
        GateOutcome::Reject { kind, error }
    }
}

#[derive(Clone)]
pub struct AuthGate {
    codec: TokenCodec,
    access_secret: String,
}

/// Extract the token from `Bearer <token>`
fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl AuthGate {
    pub fn new(codec: TokenCodec, access_secret: impl Into<String>) -> Self {
        Self {
            codec,
            access_secret: access_secret.into(),
        }
    }

    /// Verify the bearer access token in `header`
    ///
    /// # Errors
    /// - `MissingToken` if the header is absent or not a bearer header
    /// - `TokenInvalid` if the token is expired, forged or malformed
    pub fn authenticate(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let token = header.and_then(bearer_token).ok_or(AuthError::MissingToken)?;

        let claims: AccessClaims = self
            .codec
            .verify(token, &self.access_secret)
            .map_err(|e| {
                tracing::warn!(error = %e, "Access token rejected");
                AuthError::TokenInvalid
            })?;

        Ok(Identity::from(claims))
    }

    /// Require the bound identity to hold one of `required`
    ///
    /// An empty `required` set admits any authenticated caller.
    pub fn authorize(identity: Option<&Identity>, required: &[Role]) -> Result<(), AuthError> {
        let identity = identity.ok_or(AuthError::MissingToken)?;
        if required.is_empty() || required.contains(&identity.role) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %identity.user_id,
                role = %identity.role,
                "Insufficient role"
            );
            Err(AuthError::Forbidden)
        }
    }

    /// Auth gate followed by role gate
    pub fn check(&self, header: Option<&str>, required: &[Role]) -> GateOutcome {
        let identity = match self.authenticate(header) {
            Ok(identity) => identity,
            Err(e) => return e.into(),
        };

        match Self::authorize(Some(&identity), required) {
            Ok(()) => GateOutcome::Continue(identity),
            Err(e) => e.into(),
        }
    }
}
