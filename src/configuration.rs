use std::time::Duration;

use crate::auth::{MAX_HASH_COST, MIN_HASH_COST};
use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub log: LogSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub session_cleanup_interval_seconds: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub timeout_seconds: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// JWT authentication settings
///
/// Access and refresh tokens are signed with independent secrets so that a
/// leaked key for one class cannot mint tokens of the other.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub issuer: String,
    pub hash_cost: u32,
}

pub const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 24 * 60;
pub const MAX_REFRESH_TOKEN_EXPIRY_DAYS: i64 = 365;

impl JwtSettings {
    /// Out-of-range values saturate, so issuance fails instead of panicking
    pub fn access_lifetime(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.access_token_expiry_minutes)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn refresh_lifetime(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.refresh_token_expiry_days).unwrap_or(chrono::Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.access_secret".to_string()));
        }
        if self.refresh_secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.refresh_secret".to_string()));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }
        if self.access_token_expiry_minutes <= 0 || self.refresh_token_expiry_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.access_token_expiry_minutes > MAX_ACCESS_TOKEN_EXPIRY_MINUTES {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.access_token_expiry_minutes must be at most {}",
                MAX_ACCESS_TOKEN_EXPIRY_MINUTES
            )));
        }
        if self.refresh_token_expiry_days > MAX_REFRESH_TOKEN_EXPIRY_DAYS {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.refresh_token_expiry_days must be at most {}",
                MAX_REFRESH_TOKEN_EXPIRY_DAYS
            )));
        }
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.hash_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.hash_cost must be between {} and {}",
                MIN_HASH_COST, MAX_HASH_COST
            )));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()
    }
}

/// Load settings from `configuration.*` (optional) and `APP__*` environment
/// variables, e.g. `APP__JWT__ACCESS_SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8080_i64)?
        .set_default("application.session_cleanup_interval_seconds", 3600_i64)?
        .set_default("database.timeout_seconds", 5_i64)?
        .set_default("jwt.access_token_expiry_minutes", 15_i64)?
        .set_default("jwt.refresh_token_expiry_days", 7_i64)?
        .set_default("jwt.issuer", "user_accounts")?
        .set_default("jwt.hash_cost", i64::from(bcrypt::DEFAULT_COST))?
        .set_default("log.level", "info")?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let settings = settings.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            access_secret: "access-secret-at-least-32-characters".to_string(),
            refresh_secret: "refresh-secret-at-least-32-characters".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            issuer: "test".to_string(),
            hash_cost: MIN_HASH_COST,
        }
    }

    #[test]
    fn test_valid_jwt_settings() {
        assert!(jwt_settings().validate().is_ok());
    }

    #[test]
    fn test_identical_secrets_are_rejected() {
        let mut settings = jwt_settings();
        settings.refresh_secret = settings.access_secret.clone();
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let mut settings = jwt_settings();
        settings.access_secret = String::new();
        assert!(matches!(settings.validate(), Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_non_positive_lifetime_is_rejected() {
        let mut settings = jwt_settings();
        settings.access_token_expiry_minutes = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unbounded_lifetime_is_rejected() {
        let mut settings = jwt_settings();
        settings.refresh_token_expiry_days = 1_000_000_000;
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidValue(_))));

        let mut settings = jwt_settings();
        settings.access_token_expiry_minutes = MAX_ACCESS_TOKEN_EXPIRY_MINUTES + 1;
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_out_of_range_lifetime_saturates() {
        let mut settings = jwt_settings();
        settings.refresh_token_expiry_days = i64::MAX;
        assert_eq!(settings.refresh_lifetime(), chrono::Duration::MAX);
    }

    #[test]
    fn test_lifetimes() {
        let settings = jwt_settings();
        assert_eq!(settings.access_lifetime(), chrono::Duration::minutes(15));
        assert_eq!(settings.refresh_lifetime(), chrono::Duration::days(7));
    }
}
