use std::net::IpAddr;
use std::time::Duration;

use crate::auth::{MAX_HASH_COST, MIN_HASH_COST};
use crate::error::ConfigError;

/// Minimum signing secret length in bytes (HS512 key)
const MIN_SECRET_LENGTH: usize = 32;

/// Upper bound for token lifetimes and the refresh window (one year)
const MAX_LIFETIME_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub tokens: TokenSettings,
    #[serde(default)]
    pub origin: OriginSettings,
    pub notification: NotificationSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_millis: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_millis)
    }
}

/// Token issuance and rotation settings
#[derive(serde::Deserialize, Clone)]
pub struct TokenSettings {
    /// Server-held HS512 key; never derived from user data
    pub signing_secret: String,
    pub issuer: String,
    pub access_token_ttl_seconds: i64,  // e.g. 900 for 15 minutes
    pub refresh_window_seconds: i64,    // e.g. 604800 for 7 days
    pub hash_cost: u32,
    pub store_timeout_millis: u64,
}

impl TokenSettings {
    /// Reject settings the lifecycle manager cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_secret.is_empty() {
            return Err(ConfigError::MissingRequired("tokens.signing_secret".to_string()));
        }
        if self.signing_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "tokens.signing_secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("tokens.issuer".to_string()));
        }
        if self.access_token_ttl_seconds <= 0 || self.refresh_window_seconds <= 0 {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.access_token_ttl_seconds > MAX_LIFETIME_SECONDS
            || self.refresh_window_seconds > MAX_LIFETIME_SECONDS
        {
            return Err(ConfigError::InvalidValue(format!(
                "token lifetimes must not exceed {} seconds",
                MAX_LIFETIME_SECONDS
            )));
        }
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.hash_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "tokens.hash_cost must be within {}..={}",
                MIN_HASH_COST,
                MAX_HASH_COST
            )));
        }
        if self.store_timeout_millis == 0 {
            return Err(ConfigError::InvalidValue(
                "tokens.store_timeout_millis must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_millis)
    }
}

/// Which peers may vouch for the client address through a forwarded header
#[derive(serde::Deserialize, Clone)]
pub struct OriginSettings {
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,
}

impl Default for OriginSettings {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            forwarded_header: default_forwarded_header(),
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct NotificationSettings {
    pub base_url: String,
    #[serde(default = "default_notification_timeout")]
    pub timeout_millis: u64,
}

impl NotificationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

fn default_acquire_timeout() -> u64 {
    2000
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

fn default_notification_timeout() -> u64 {
    2000
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        // e.g. APP_TOKENS__SIGNING_SECRET overrides tokens.signing_secret
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
