//! Configuration types, loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default time-to-live for repository listings in the cache (3 hours).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Telegram user IDs allowed to open the admin panel.
    pub admin_ids: Vec<String>,
    /// Path of the local libSQL database file.
    pub db_path: PathBuf,
    /// How long cached repository listings stay fresh.
    pub cache_ttl: Duration,
    /// Broadcast throttling knobs.
    pub broadcast: BroadcastConfig,
}

/// Delivery-loop throttling configuration.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Pause after every successful send.
    pub base_delay: Duration,
    /// Pause after a rate-limited send, instead of the base delay.
    pub penalty_delay: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(60),
            penalty_delay: Duration::from_millis(1500),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            admin_ids: Vec::new(),
            db_path: PathBuf::from("data/kabo.db"),
            cache_ttl: DEFAULT_CACHE_TTL,
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load the configuration from environment variables.
    ///
    /// `BOT_TOKEN` and `ADMIN_IDS` (comma-separated user IDs) are required;
    /// everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = required("BOT_TOKEN")?;
        let admin_ids: Vec<String> = required("ADMIN_IDS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let db_path = std::env::var("KABO_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/kabo.db"));

        let cache_ttl = duration_var("KABO_CACHE_TTL_SECS", DEFAULT_CACHE_TTL)?;

        let broadcast = BroadcastConfig {
            base_delay: duration_ms_var("KABO_SEND_DELAY_MS", Duration::from_millis(60))?,
            penalty_delay: duration_ms_var(
                "KABO_RATE_LIMIT_DELAY_MS",
                Duration::from_millis(1500),
            )?,
        };

        Ok(Self {
            bot_token,
            admin_ids,
            db_path,
            cache_ttl,
            broadcast,
        })
    }

    /// Check whether a Telegram user ID belongs to an administrator.
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_ids.iter().any(|id| id == user_id)
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn duration_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(name, default, Duration::from_secs)
}

fn duration_ms_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(name, default, Duration::from_millis)
}

fn parse_var(
    name: &str,
    default: Duration,
    make: fn(u64) -> Duration,
) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(make)
            .map_err(|e| ConfigError::InvalidValue {
                key: name.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}
