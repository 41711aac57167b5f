use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub extractor: ExtractorConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub user_agent: String,
    pub request_timeout: u64,
    /// Currency used when the page carries no recognizable indicator.
    pub default_currency: String,
    /// Ordered price-selector candidates tried when a link has no override.
    /// Order matters; this is heuristic policy, not a contract.
    pub price_selectors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub max_concurrent_jobs: usize,
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub page_size: u32,
    /// Refresh lead time: credentials expiring within this many seconds are
    /// refreshed before any protected call is attempted.
    pub refresh_margin_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub sync_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    pub etsy: EtsyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtsyConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SHOPWATCH"
            .add_source(Environment::with_prefix("SHOPWATCH").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message(
                "Database min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.extractor.user_agent.is_empty() {
            return Err(ConfigError::Message("Extractor user_agent must be set".into()));
        }

        if self.extractor.default_currency.len() != 3 {
            return Err(ConfigError::Message(
                "Extractor default_currency must be a 3-letter code".into(),
            ));
        }

        if self.extractor.price_selectors.is_empty() {
            return Err(ConfigError::Message(
                "Extractor price_selectors must contain at least one candidate".into(),
            ));
        }

        if self.sync.max_concurrent_jobs == 0 {
            return Err(ConfigError::Message(
                "Sync max_concurrent_jobs must be greater than 0".into(),
            ));
        }

        if self.sync.page_size == 0 {
            return Err(ConfigError::Message("Sync page_size must be greater than 0".into()));
        }

        if !is_valid_cron(&self.scheduler.sync_interval) {
            return Err(ConfigError::Message(
                "Invalid cron expression in scheduler.sync_interval".into(),
            ));
        }

        if !self.platforms.etsy.api_base.is_empty()
            && Url::parse(&self.platforms.etsy.api_base).is_err()
        {
            return Err(ConfigError::Message("Invalid Etsy api_base URL".into()));
        }

        Ok(())
    }
}

/// Basic cron validation - 5 parts (minute hour day month weekday)
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 5 {
        return false;
    }

    for part in parts {
        if part.is_empty() {
            return false;
        }
        // Allow numbers, ranges, lists, wildcards, and steps
        if !part
            .chars()
            .all(|c| c.is_ascii_digit() || c == '*' || c == '-' || c == ',' || c == '/')
        {
            return false;
        }
    }

    true
}
