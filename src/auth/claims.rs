/// JWT Claims structures
///
/// Access and refresh tokens carry different, strongly typed payloads. A
/// payload that does not decode into the expected structure (identity not
/// numeric, unknown role, missing field) is rejected as malformed.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

const TOKEN_ID_LENGTH: usize = 32;

/// Account identifier as stored by the account store
pub type UserId = i64;

/// Closed set of account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(ValidationError::InvalidFormat(format!(
                "role must be one of user, admin (got {:?})",
                s
            ))),
        }
    }
}

/// Claims of a short-lived access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (account id)
    pub sub: UserId,
    pub role: Role,
}

/// Claims of a long-lived refresh token
///
/// Carries no role: the role is re-read from the account store whenever a
/// refresh token is exchanged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    /// Subject (account id)
    pub sub: UserId,
    /// Random token id, makes every refresh token unique
    pub jti: String,
}

impl RefreshClaims {
    pub fn new(user_id: UserId) -> Self {
        Self {
            sub: user_id,
            jti: generate_token_id(),
        }
    }
}

/// Registered claims added by the codec around either payload
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignedClaims<C> {
    #[serde(flatten)]
    pub claims: C,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Verified caller identity bound to a request by the auth gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl From<AccessClaims> for Identity {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

fn generate_token_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_ID_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.to_string(), "user");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }

    #[test]
    fn test_refresh_claims_get_unique_ids() {
        let first = RefreshClaims::new(42);
        let second = RefreshClaims::new(42);

        assert_eq!(first.jti.len(), TOKEN_ID_LENGTH);
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_signed_claims_flatten_payload() {
        let signed = SignedClaims {
            claims: AccessClaims { sub: 7, role: Role::User },
            iss: "test".to_string(),
            iat: 1,
            exp: 2,
        };
        let value = serde_json::to_value(&signed).unwrap();

        assert_eq!(value["sub"], 7);
        assert_eq!(value["role"], "user");
        assert_eq!(value["exp"], 2);
    }

    #[test]
    fn test_non_numeric_subject_does_not_decode() {
        let value = serde_json::json!({
            "sub": "42", "role": "user", "iss": "test", "iat": 1, "exp": 2
        });
        assert!(serde_json::from_value::<SignedClaims<AccessClaims>>(value).is_err());
    }

    #[test]
    fn test_refresh_payload_is_not_an_access_payload() {
        let value = serde_json::json!({
            "sub": 42, "jti": "abc", "iss": "test", "iat": 1, "exp": 2
        });
        assert!(serde_json::from_value::<SignedClaims<AccessClaims>>(value).is_err());
    }
}
