//! Application configuration loaded from environment variables.
//!
//! Values are read once at startup. A `.env` file is honored for local
//! development.

use std::env;
use std::str::FromStr;

const DEFAULT_URL_EXPIRY_HOURS: u64 = 1;
const DEFAULT_REFRESH_BUFFER_MINUTES: u64 = 10;
const DEFAULT_SWEEP_INTERVAL_MINUTES: u64 = 15;

/// Longest signed-URL lifetime accepted (one week).
pub const MAX_URL_EXPIRY_HOURS: u64 = 7 * 24;
/// Longest sweep period accepted (one day).
pub const MAX_SWEEP_INTERVAL_MINUTES: u64 = 24 * 60;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Base URL of the blob storage service (e.g. `https://xyz.supabase.co`)
    pub storage_url: String,
    /// Bucket holding user photos
    pub photos_bucket: String,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,

    // --- Photo URL cache tuning ---
    /// Lifetime requested for each signed URL
    pub url_expiry_hours: u64,
    /// Lead time before expiry at which a cached URL is regenerated
    pub refresh_buffer_minutes: u64,
    /// Period of the background sweep that drops expired URLs
    pub sweep_interval_minutes: u64,

    // --- Secrets ---
    /// Service-role key for the storage signing API
    pub storage_service_key: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Config for tests. Points storage at an unroutable local address.
    pub fn test_default() -> Self {
        Self {
            storage_url: "http://127.0.0.1:9".to_string(),
            photos_bucket: "photos".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            url_expiry_hours: DEFAULT_URL_EXPIRY_HOURS,
            refresh_buffer_minutes: DEFAULT_REFRESH_BUFFER_MINUTES,
            sweep_interval_minutes: DEFAULT_SWEEP_INTERVAL_MINUTES,
            storage_service_key: "test_service_key".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let config = Self {
            storage_url: env::var("STORAGE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("STORAGE_URL"))?,
            photos_bucket: env::var("PHOTOS_BUCKET").unwrap_or_else(|_| "photos".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_or("PORT", 8080),

            url_expiry_hours: parse_or("PHOTO_URL_EXPIRY_HOURS", DEFAULT_URL_EXPIRY_HOURS),
            refresh_buffer_minutes: parse_or(
                "PHOTO_URL_REFRESH_BUFFER_MINUTES",
                DEFAULT_REFRESH_BUFFER_MINUTES,
            ),
            sweep_interval_minutes: parse_or(
                "PHOTO_URL_SWEEP_INTERVAL_MINUTES",
                DEFAULT_SWEEP_INTERVAL_MINUTES,
            ),

            storage_service_key: env::var("STORAGE_SERVICE_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STORAGE_SERVICE_KEY"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_URL_EXPIRY_HOURS).contains(&self.url_expiry_hours) {
            return Err(ConfigError::Invalid(format!(
                "PHOTO_URL_EXPIRY_HOURS must be between 1 and {}",
                MAX_URL_EXPIRY_HOURS
            )));
        }
        let expiry_minutes = self.url_expiry_hours.checked_mul(60).unwrap_or(u64::MAX);
        if self.refresh_buffer_minutes >= expiry_minutes {
            return Err(ConfigError::Invalid(format!(
                "refresh buffer ({} min) must be shorter than URL expiry ({} h)",
                self.refresh_buffer_minutes, self.url_expiry_hours
            )));
        }
        if !(1..=MAX_SWEEP_INTERVAL_MINUTES).contains(&self.sweep_interval_minutes) {
            return Err(ConfigError::Invalid(format!(
                "PHOTO_URL_SWEEP_INTERVAL_MINUTES must be between 1 and {}",
                MAX_SWEEP_INTERVAL_MINUTES
            )));
        }
        Ok(())
    }
}

/// Parse an optional env var, falling back to `default` when unset or malformed.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("STORAGE_URL", "https://storage.example.com/");
        env::set_var("STORAGE_SERVICE_KEY", " service_key ");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("PHOTO_URL_REFRESH_BUFFER_MINUTES", "not-a-number");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.storage_url, "https://storage.example.com");
        assert_eq!(config.storage_service_key, "service_key");
        assert_eq!(config.refresh_buffer_minutes, 10);
        assert_eq!(config.url_expiry_hours, 1);
    }

    #[test]
    fn test_buffer_must_be_shorter_than_expiry() {
        let config = Config {
            refresh_buffer_minutes: 60,
            ..Config::test_default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        assert!(Config::test_default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_tunables_are_invalid() {
        let huge_expiry = Config {
            url_expiry_hours: u64::MAX / 2,
            ..Config::test_default()
        };
        assert!(matches!(huge_expiry.validate(), Err(ConfigError::Invalid(_))));

        let huge_sweep = Config {
            sweep_interval_minutes: u64::MAX,
            ..Config::test_default()
        };
        assert!(matches!(huge_sweep.validate(), Err(ConfigError::Invalid(_))));

        let longest = Config {
            url_expiry_hours: MAX_URL_EXPIRY_HOURS,
            refresh_buffer_minutes: u64::MAX,
            ..Config::test_default()
        };
        assert!(matches!(longest.validate(), Err(ConfigError::Invalid(_))));

        let zero_sweep = Config {
            sweep_interval_minutes: 0,
            ..Config::test_default()
        };
        assert!(zero_sweep.validate().is_err());
    }
}
