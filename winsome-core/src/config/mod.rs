//! Configuration management for Winsome
//!
//! Settings come from defaults, an optional TOML file and `WINSOME_*`
//! environment variables, in that order of precedence (later wins).

use serde::{Deserialize, Serialize};
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command channel and gateway
    pub server: ServerConfig,

    /// Reward datagrams and follower pushes
    pub notify: NotifyConfig,

    /// Rewards sweep
    pub rewards: RewardsConfig,

    /// Text and tag bounds
    pub limits: LimitsConfig,

    /// Persistence
    pub store: StoreConfig,

    /// Currency conversion service
    pub conversion: ConversionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP command channel bind address
    pub command_address: SocketAddr,

    /// Login/registration/push gateway bind address
    pub gateway_address: SocketAddr,

    /// Upper bound on one wait of the event loop
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Worker pool size
    pub max_workers: usize,

    /// Maximum concurrent command connections
    pub max_connections: usize,

    /// Request bytes buffered before the frame is rejected
    pub max_frame_size: usize,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Multicast group and port for reward announcements
    pub multicast_address: SocketAddr,

    /// Buffered pushes per subscriber before new ones are dropped
    pub subscriber_queue: usize,
}

/// Rewards configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Time between sweeps
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Fraction of each post's reward paid to its author
    pub author_share: f64,
}

/// Length and count bounds for user-supplied text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub username_max: usize,
    pub password_max: usize,
    pub title_max: usize,
    pub content_max: usize,
    pub comment_max: usize,
    pub max_tags: usize,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Data directory for persistent storage
    pub data_dir: PathBuf,
}

/// Conversion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Endpoint returning a plain-text decimal rate
    pub url: String,

    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 6789)),
            gateway_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 6790)),
            poll_timeout: Duration::from_secs(2),
            max_workers: 16,
            max_connections: 1024,
            max_frame_size: 64 * 1024,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            multicast_address: SocketAddr::from((Ipv4Addr::new(239, 255, 32, 32), 44444)),
            subscriber_queue: 32,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(100), author_share: 0.75 }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            username_max: 20,
            password_max: 20,
            title_max: 100,
            content_max: 500,
            comment_max: 200,
            max_tags: 5,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./winsome_data") }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            url: "https://www.random.org/decimal-fractions/?num=1&dec=10&col=1&format=plain&rnd=new"
                .to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

fn env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(raw.trim()).map(Some).map_err(|e| {
            ConfigError::InvalidValue { key: key.to_string(), reason: e.to_string() }
        }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Overwrite fields that have a `WINSOME_*` variable set
    ///
    /// Variables follow the pattern WINSOME_<SECTION>_<KEY>, for example
    /// WINSOME_SERVER_COMMAND_ADDRESS=0.0.0.0:6789
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse("WINSOME_SERVER_COMMAND_ADDRESS")? {
            self.server.command_address = v;
        }
        if let Some(v) = env_parse("WINSOME_SERVER_GATEWAY_ADDRESS")? {
            self.server.gateway_address = v;
        }
        if let Some(v) = env_duration("WINSOME_SERVER_POLL_TIMEOUT")? {
            self.server.poll_timeout = v;
        }
        if let Some(v) = env_parse("WINSOME_SERVER_MAX_WORKERS")? {
            self.server.max_workers = v;
        }
        if let Some(v) = env_parse("WINSOME_SERVER_MAX_CONNECTIONS")? {
            self.server.max_connections = v;
        }

        if let Some(v) = env_parse("WINSOME_NOTIFY_MULTICAST_ADDRESS")? {
            self.notify.multicast_address = v;
        }

        if let Some(v) = env_duration("WINSOME_REWARDS_INTERVAL")? {
            self.rewards.interval = v;
        }
        if let Some(v) = env_parse("WINSOME_REWARDS_AUTHOR_SHARE")? {
            self.rewards.author_share = v;
        }

        if let Ok(dir) = env::var("WINSOME_STORE_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }

        if let Ok(url) = env::var("WINSOME_CONVERSION_URL") {
            self.conversion.url = url;
        }

        if let Ok(level) = env::var("WINSOME_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = env_parse("WINSOME_LOG_JSON")? {
            self.logging.json_format = v;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.server.max_frame_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_frame_size must be greater than 0".to_string(),
            ));
        }

        if self.server.poll_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_timeout must be greater than 0".to_string(),
            ));
        }

        if !self.notify.multicast_address.ip().is_multicast() {
            return Err(ConfigError::ValidationFailed(format!(
                "{} is not a multicast address",
                self.notify.multicast_address.ip()
            )));
        }

        if self.notify.subscriber_queue == 0 {
            return Err(ConfigError::ValidationFailed(
                "subscriber_queue must be greater than 0".to_string(),
            ));
        }

        if self.rewards.interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "rewards interval must be greater than 0".to_string(),
            ));
        }

        let share = self.rewards.author_share;
        if !(share > 0.0 && share <= 1.0) {
            return Err(ConfigError::ValidationFailed(format!(
                "author_share must be in (0, 1], got {}",
                share
            )));
        }

        let limits = &self.limits;
        for (name, value) in [
            ("username_max", limits.username_max),
            ("password_max", limits.password_max),
            ("title_max", limits.title_max),
            ("content_max", limits.content_max),
            ("comment_max", limits.comment_max),
            ("max_tags", limits.max_tags),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "warning", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rewards.author_share, 0.75);
        assert_eq!(config.limits.max_tags, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.max_workers = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.rewards.author_share = 0.0;
        assert!(config.validate().is_err());
        config.rewards.author_share = 1.0;
        assert!(config.validate().is_ok());
        config.rewards.author_share = 1.5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.notify.multicast_address = "127.0.0.1:44444".parse().unwrap();
        assert!(config.validate().is_err());

        config = Config::default();
        config.limits.title_max = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("winsome.toml");

        let mut config = Config::default();
        config.rewards.interval = Duration::from_secs(30);
        config.limits.content_max = 1000;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.rewards.interval, Duration::from_secs(30));
        assert_eq!(loaded.limits.content_max, 1000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[rewards]\ninterval = \"5s\"\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.rewards.interval, Duration::from_secs(5));
        assert_eq!(loaded.rewards.author_share, 0.75);
        assert_eq!(loaded.server.command_address, ServerConfig::default().command_address);
    }

    #[test]
    fn test_bad_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[rewards\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::ParseError(_))));
    }
}
