/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and password strength validation.
/// bcrypt gives a fresh random salt per hash and compares digests in
/// constant time.

use crate::error::{AppError, ValidationError};

pub const MIN_HASH_COST: u32 = 4;
pub const MAX_HASH_COST: u32 = 31;

const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt ignores every byte past the 72nd
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Salted, adaptive-cost password hasher
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    cost: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a password using bcrypt
    ///
    /// Two calls with the same input yield different digests.
    ///
    /// # Errors
    /// - `ValidationError::TooLong` for passwords over 72 bytes
    /// - `AppError::Hashing` if bcrypt itself fails
    pub fn hash_password(&self, password: &str) -> Result<String, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_BYTES).into());
        }
        bcrypt::hash(password, self.cost)
            .map_err(|e| AppError::Hashing(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash
    ///
    /// A wrong password is `Ok(false)`, never an error. So is any password
    /// over 72 bytes, since no stored digest can have been made from one.
    ///
    /// # Errors
    /// Returns `AppError::Hashing` if `hash` is not a readable bcrypt digest
    pub fn verify_password(&self, hash: &str, password: &str) -> Result<bool, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        bcrypt::verify(password, hash)
            .map_err(|e| AppError::Hashing(format!("Password verification failed: {}", e)))
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 72 bytes (not characters)
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_BYTES,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        ));
    }

    Ok(())
}
