//! Configuration management with validation and defaults
//!
//! One `NodeConfig` drives the game rules, the simulated chain, storage, the
//! HTTP API and monitoring. It loads from TOML, accepts `BHG_*` environment
//! overrides and is validated before use.

use crate::errors::{ConfigurationError, NodeResult};
use crate::settlement::DustPolicy;
use crate::types::{Amount, BetRange};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub game: GameRules,
    pub chain: ChainConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// Game constants. Guesses are whole units scaled by `10^unit_decimals`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    pub min_guess: u64,
    pub max_guess: u64,
    pub unit_decimals: u32,
    /// Blocks between round creation and its target block
    pub blocks_to_wait: u64,
    /// How many recent block hashes stay retrievable
    pub blockhash_window: u64,
    pub dust_policy: DustPolicy,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            min_guess: 10,
            max_guess: 50,
            unit_decimals: 18,
            blocks_to_wait: 5,
            blockhash_window: 256,
            dust_policy: DustPolicy::Strand,
        }
    }
}

impl GameRules {
    pub fn bet_range(&self) -> BetRange {
        BetRange::new(self.min_guess, self.max_guess, self.unit_decimals)
    }

    pub fn min_bet(&self) -> Amount {
        self.bet_range().min_bet()
    }

    pub fn max_bet(&self) -> Amount {
        self.bet_range().max_bet()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.min_guess == 0 {
            return Err(invalid("game.min_guess", "0", "must be > 0 so 0 stays the unfinalized sentinel"));
        }
        if self.min_guess > self.max_guess {
            return Err(invalid(
                "game.max_guess",
                &self.max_guess.to_string(),
                "must be >= min_guess",
            ));
        }
        if self.unit_decimals > 24 {
            return Err(invalid(
                "game.unit_decimals",
                &self.unit_decimals.to_string(),
                "must be <= 24",
            ));
        }
        if (self.max_guess as u128)
            .checked_mul(10u128.pow(self.unit_decimals))
            .is_none()
        {
            return Err(invalid(
                "game.max_guess",
                &self.max_guess.to_string(),
                "scaled by 10^unit_decimals must fit in 128 bits",
            ));
        }
        if self.blocks_to_wait == 0 {
            return Err(invalid("game.blocks_to_wait", "0", "must be > 0"));
        }
        if self.blockhash_window == 0 {
            return Err(invalid("game.blockhash_window", "0", "must be > 0"));
        }
        Ok(())
    }
}

/// Simulated chain and block production settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Wall-clock interval between produced blocks
    pub block_interval_ms: u64,
    /// Timestamp step used when mining blocks deterministically
    pub block_time_secs: u64,
    pub genesis_seed: String,
    /// Finalize rounds automatically once they become finalizable
    pub auto_finalize: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: 2_000,
            block_time_secs: 2,
            genesis_seed: "blockhash-guess-genesis".to_string(),
            auto_finalize: false,
        }
    }
}

/// Persistent storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub data_directory: String,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_directory: "./DB/rounds".to_string(),
            clear_on_start: false,
        }
    }
}

/// HTTP API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub node_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            node_id: "blockhash-guess-1".to_string(),
        }
    }
}

/// Monitoring and logging settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    pub enable_metrics: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            enable_metrics: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive string for `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(invalid("monitoring.log_level", s, "expected error|warn|info|debug|trace")),
        }
    }
}

impl NodeConfig {
    /// Fast blocks, no persistence. Used by tests and local runs.
    pub fn testing() -> Self {
        Self {
            chain: ChainConfig {
                block_interval_ms: 50,
                block_time_secs: 1,
                ..Default::default()
            },
            storage: StorageConfig {
                enabled: false,
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Durable storage, keeper enabled
    pub fn production() -> Self {
        Self {
            chain: ChainConfig {
                block_interval_ms: 2_000,
                auto_finalize: true,
                ..Default::default()
            },
            storage: StorageConfig {
                enabled: true,
                data_directory: "./DB/rounds".to_string(),
                clear_on_start: false, // Production: preserve round history
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.game.validate()?;

        if self.chain.block_interval_ms == 0 {
            return Err(invalid("chain.block_interval_ms", "0", "must be > 0"));
        }
        if self.chain.block_time_secs == 0 {
            return Err(invalid("chain.block_time_secs", "0", "must be > 0"));
        }
        if self.storage.enabled && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::ValidationFailed(
                "storage.data_directory is required when storage is enabled".to_string(),
            ));
        }
        if self.api.port == 0 {
            return Err(invalid("api.port", "0", "Port cannot be zero"));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(invalid("api.request_timeout_secs", "0", "must be > 0"));
        }

        Ok(())
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.chain.block_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| invalid(name, &value, reason))
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
    skip_env: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Ignore `BHG_*` environment variables
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Load configuration from file and environment variables, then validate
    pub fn load(&self) -> NodeResult<NodeConfig> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => NodeConfig::default(),
        };

        if !self.skip_env {
            Self::apply_env_overrides(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &str) -> Result<NodeConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(config: &mut NodeConfig) -> Result<(), ConfigurationError> {
        if let Ok(host) = env::var("BHG_API_HOST") {
            config.api.host = host;
        }
        if let Ok(port) = env::var("BHG_API_PORT") {
            config.api.port = parse_env("BHG_API_PORT", port, "Invalid port number")?;
        }
        if let Ok(dir) = env::var("BHG_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Ok(interval) = env::var("BHG_BLOCK_INTERVAL_MS") {
            config.chain.block_interval_ms =
                parse_env("BHG_BLOCK_INTERVAL_MS", interval, "Invalid interval")?;
        }
        if let Ok(flag) = env::var("BHG_AUTO_FINALIZE") {
            config.chain.auto_finalize = parse_env("BHG_AUTO_FINALIZE", flag, "Invalid boolean value")?;
        }
        if let Ok(level) = env::var("BHG_LOG_LEVEL") {
            config.monitoring.log_level = level.parse()?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(config: &NodeConfig, path: &str) -> NodeResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)?;
        Ok(())
    }
}
