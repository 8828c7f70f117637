//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Price versioning configuration.
    #[serde(default)]
    pub pricing: PricingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Price versioning configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Fixed offset of the business timezone from UTC, in whole hours.
    #[serde(default = "default_business_utc_offset_hours")]
    pub business_utc_offset_hours: i32,
    /// Pending prices may not start before the next business-local midnight.
    #[serde(default = "default_require_next_business_day")]
    pub require_next_business_day: bool,
    /// Maximum number of memoized resolutions.
    #[serde(default = "default_resolution_cache_capacity")]
    pub resolution_cache_capacity: u64,
    /// Time-to-live of a memoized resolution in seconds.
    #[serde(default = "default_resolution_cache_ttl_secs")]
    pub resolution_cache_ttl_secs: u64,
}

fn default_business_utc_offset_hours() -> i32 {
    7
}

fn default_require_next_business_day() -> bool {
    true
}

fn default_resolution_cache_capacity() -> u64 {
    10_000
}

fn default_resolution_cache_ttl_secs() -> u64 {
    60
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            business_utc_offset_hours: default_business_utc_offset_hours(),
            require_next_business_day: default_require_next_business_day(),
            resolution_cache_capacity: default_resolution_cache_capacity(),
            resolution_cache_ttl_secs: default_resolution_cache_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("PRICEBOOK").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
